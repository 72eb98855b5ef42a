#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = codegrade::run_worker().await {
        eprintln!("codegrade-worker fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
