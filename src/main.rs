#[tokio::main]
async fn main() {
    if let Err(e) = pairtalk_lib::run().await {
        eprintln!("pairtalk: {e}");
        std::process::exit(1);
    }
}
