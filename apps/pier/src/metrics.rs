use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

pub static CONNECTIONS: Lazy<IntCounter> = Lazy::new(|| {
    let c = IntCounter::with_opts(Opts::new(
        "pier_connections_total",
        "websocket connections accepted",
    ))
    .expect("valid metric");
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

pub static LIVE_CONNECTIONS: Lazy<IntGauge> = Lazy::new(|| {
    let g = IntGauge::with_opts(Opts::new(
        "pier_live_connections",
        "websocket connections currently open",
    ))
    .expect("valid metric");
    REGISTRY.register(Box::new(g.clone())).ok();
    g
});

pub static JOINS: Lazy<IntCounter> = Lazy::new(|| {
    let c = IntCounter::with_opts(Opts::new("pier_joins_total", "successful joins"))
        .expect("valid metric");
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

pub static RELAYED: Lazy<IntCounterVec> = Lazy::new(|| {
    let c = IntCounterVec::new(
        Opts::new(
            "pier_relayed_messages_total",
            "negotiation messages relayed by kind",
        ),
        &["kind"],
    )
    .expect("valid metric");
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

pub static SIGNAL_ERRORS: Lazy<IntCounterVec> = Lazy::new(|| {
    let c = IntCounterVec::new(
        Opts::new(
            "pier_signal_errors_total",
            "rejected client messages by error code",
        ),
        &["code"],
    )
    .expect("valid metric");
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

pub fn gather() -> Vec<u8> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        buffer.clear();
    }
    buffer
}
