#[tokio::main]
async fn main() -> eyre::Result<()> {
    let app = apiprobe::App::new();
    app.run().await?;
    Ok(())
}
