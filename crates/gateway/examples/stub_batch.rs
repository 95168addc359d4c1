//! Embed a small mixed batch with the deterministic stub provider.
//!
//! ```text
//! cargo run -p vecgate-gateway --example stub_batch
//! ```

use gateway::{BatchRequest, Gateway, GatewayConfig, ImageReference, InputRecord, ProviderKind};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut config = GatewayConfig::default();
    config.provider.kind = ProviderKind::Stub;
    config.dimensions = 8;
    config.normalize = true;
    let gateway = Gateway::new(config)?;

    let batch = BatchRequest::new(vec![
        InputRecord::image(
            "img-1",
            ImageReference::new("https://acct.blob.core.windows.net/images/apple.jpg")
                .with_token("?sv=2023-01-03&sig=example"),
        ),
        InputRecord::text("q-1", "a green apple on a table"),
        InputRecord::text("q-2", ""),
    ]);

    let response = gateway.embed(batch).await?;
    for record in &response.records {
        match record.result.vector() {
            Some(vector) => println!("{}: {:?}", record.record_id, vector),
            None => println!("{}: error {:?}", record.record_id, record.result.error()),
        }
    }
    println!("{} of {} embedded", response.succeeded(), response.len());
    Ok(())
}
