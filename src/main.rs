#[tokio::main]
async fn main() -> anyhow::Result<()> {
    ollama_chat::run().await
}
