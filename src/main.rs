#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = codegrade::run().await {
        eprintln!("codegrade fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
