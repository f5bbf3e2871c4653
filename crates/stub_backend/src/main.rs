use std::net::SocketAddr;

use finsight_stub::StubState;

const PORT_ENV: &str = "FINSIGHT_STUB_PORT";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let port = match std::env::var(PORT_ENV) {
        Ok(value) => value.parse::<u16>()?,
        Err(_) => 8080,
    };
    let state = StubState::new();
    let (addr, server) =
        finsight_stub::spawn(state, SocketAddr::from(([127, 0, 0, 1], port))).await?;
    println!("FinSight stub backend on http://{}", addr);
    server.await?;
    Ok(())
}
