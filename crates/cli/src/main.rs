use std::io;
use std::thread;

use camstream::Server;
use camstream::producer::{NoEncoder, Producer, TestPatternSource};
use clap::Parser;

#[derive(Parser)]
#[command(
    name = "camstream-server",
    about = "Standalone RTSP server for a single H.264 video stream"
)]
struct Args {
    /// Bind address (host:port) for RTSP signaling.
    #[arg(long, short, default_value = "0.0.0.0:8554")]
    bind: String,

    /// Frame width for the synthetic test-pattern source.
    #[arg(long, default_value_t = 640)]
    width: u32,

    /// Frame height for the synthetic test-pattern source.
    #[arg(long, default_value_t = 480)]
    height: u32,

    /// Frame rate driving the 90 kHz RTP clock.
    #[arg(long, default_value_t = 30)]
    fps: u32,
}

fn main() {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let mut server = Server::new(&args.bind);

    let hub = match server.start() {
        Ok(hub) => hub,
        Err(e) => {
            eprintln!("failed to start server: {}", e);
            return;
        }
    };

    // No hardware encoder is wired up by default — `NoEncoder` reports a
    // failure every frame, which the Producer logs and skips. Swap in a
    // real `Encoder` impl to publish an actual stream.
    let producer = Producer::new(
        TestPatternSource::new(args.width, args.height, args.fps),
        NoEncoder,
        hub,
        args.fps,
    );
    let producer_running = producer.running_flag();

    thread::spawn(move || producer.run());

    println!("RTSP server on {} — press Enter to stop", args.bind);
    let mut input = String::new();
    io::stdin().read_line(&mut input).ok();

    producer_running.store(false, std::sync::atomic::Ordering::SeqCst);
    server.stop();
}
