use std::collections::BTreeMap;
use std::future::Future;
use std::io::Write;
use std::net::{SocketAddr, UdpSocket};
use std::pin::Pin;

use anyhow::{Context, Result};
use pullcache_service::metrics;
use tracing_subscriber::fmt::fmt;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::prelude::*;

#[derive(Debug, Default)]
pub struct Config {
    pub tracing: bool,
    pub metrics: bool,
}

#[derive(Default)]
pub struct Guard {
    pub udp_sink: Option<Pin<Box<dyn Future<Output = ()> + Send>>>,
}

pub fn init(config: Config) -> Result<Guard> {
    let mut guard = Guard::default();

    if config.tracing {
        let rust_log = "INFO,pullcache_service=TRACE";
        let subscriber = fmt()
            .with_timer(UtcTime::rfc_3339())
            .with_target(true)
            .with_env_filter(rust_log);

        // we want all the tracing machinery to be active, but not spam the console,
        // so redirect everything into the void:
        let subscriber = subscriber.with_writer(|| NoopWriter);

        // this should mimic the json output of `pullcache_service::logging`:
        subscriber
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_span_list(true)
            .with_file(true)
            .with_line_number(true)
            .finish()
            .init();
    }

    if config.metrics {
        let addr = SocketAddr::from(([127, 0, 0, 1], 0));
        let listener = UdpSocket::bind(addr).context("failed to bind metrics sink")?;
        listener.set_nonblocking(true)?;
        let socket = listener.local_addr()?;

        guard.udp_sink = Some(Box::pin(async move {
            let Ok(listener) = tokio::net::UdpSocket::from_std(listener) else {
                return;
            };
            let mut buf = Vec::with_capacity(1024);
            loop {
                buf.clear();
                if listener.recv_buf(&mut buf).await.is_err() {
                    break;
                }
            }
        }));

        let host = format!("127.0.0.1:{}", socket.port());

        // have some default tags, just to be closer to the real world config
        let mut tags = BTreeMap::new();
        tags.insert("host".into(), "stresstest".into());
        tags.insert("env".into(), "stresstest".into());

        metrics::configure_statsd("pullcache", host, tags)?;
    }

    Ok(guard)
}

struct NoopWriter;
impl Write for NoopWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        // try to prevent the compiler from optimizing away all the formatting code:
        let buf = std::hint::black_box(buf);

        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
