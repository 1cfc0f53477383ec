use rcon::Connection;
use tokio::net::TcpStream;

use crate::config::RconConfig;

/// RCON access to the running server. A fresh connection is made per
/// command; Minecraft drops idle RCON sessions quickly enough that caching
/// one is not worth the reconnect bookkeeping.
#[derive(Debug, Clone)]
pub struct RconClient {
    address: String,
    password: String,
}

impl RconClient {
    pub fn new(config: &RconConfig) -> Self {
        Self {
            address: config.address.clone(),
            password: config.password.clone(),
        }
    }

    pub async fn exec(&self, command: &str) -> Result<String, rcon::Error> {
        let mut conn = Connection::<TcpStream>::builder()
            .enable_minecraft_quirks(true)
            .connect(self.address.as_str(), &self.password)
            .await?;
        conn.cmd(command).await
    }

    /// Output of the vanilla `list` command.
    pub async fn players(&self) -> Result<String, rcon::Error> {
        self.exec("list").await
    }
}
