#[tokio::main]
async fn main() -> anyhow::Result<()> {
    kios_pos_lib::run().await
}
