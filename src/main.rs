use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    askgem::run().await
}
