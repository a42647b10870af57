#[tokio::main]
async fn main() {
    if let Err(e) = linkfetch::run().await {
        tracing::error!(target: "startup", error = %e, "fatal");
        eprintln!("linkfetch: {}", e);
        std::process::exit(1);
    }
}
