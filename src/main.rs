#[tokio::main]
async fn main() {
    if let Err(e) = psql_registry::run().await {
        eprintln!("psql-registry: {}", e);
        std::process::exit(1);
    }
}
