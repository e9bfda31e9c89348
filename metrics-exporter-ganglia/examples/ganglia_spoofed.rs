use metrics_exporter_ganglia::{GangliaBuilder, MetricDescriptor, SenderIdentity, Slope};

fn main() {
    tracing_subscriber::fmt().with_max_level(tracing::Level::DEBUG).init();

    let emitter = GangliaBuilder::default()
        .with_server_address("127.0.0.1:1234")
        .expect("failed to parse server address")
        .with_verbose(true)
        .build()
        .expect("failed to build Ganglia emitter");

    // Report on behalf of another host, as a proxy would.
    let identity = SenderIdentity::new("127.0.0.1").with_spoof("127.0.0.1:spoof");

    for i in 0..10 {
        let descriptor = MetricDescriptor::uint32(format!("some_metric_{}", i), 8_675_309)
            .with_units("units")
            .with_slope(Slope::Both)
            .with_tmax(300)
            .with_dmax(600)
            .with_group("GROUP");

        match emitter.send_metric(&identity, &descriptor) {
            Ok(report) => tracing::info!(packets_sent = report.packets_sent(), "Sent {}.", descriptor.name()),
            Err(e) => tracing::error!(error = %e, "Failed to send {}.", descriptor.name()),
        }
    }
}
