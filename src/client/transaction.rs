//! Transaction support.

use super::Client;
use crate::error::{Error, Result};

/// A transaction started with [`Client::begin`].
///
/// The client is passed to `commit` and `rollback` to execute the transaction
/// commands. Dropping the guard without finishing leaves the transaction open.
#[derive(Debug)]
pub struct Transaction {
    connection_id: u32,
}

impl Transaction {
    pub(crate) fn new(connection_id: u32) -> Self {
        Self { connection_id }
    }

    fn check(&self, client: &Client) -> Result<()> {
        let actual = client.connection_id();
        if self.connection_id != actual {
            return Err(Error::InvalidUsage(format!(
                "connection mismatch: expected {}, got {}",
                self.connection_id, actual
            )));
        }
        Ok(())
    }

    /// Commit the transaction.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidUsage` if the client is not connected to the
    /// backend that started the transaction.
    pub async fn commit(self, client: &Client) -> Result<()> {
        self.check(client)?;
        client.simple_query("COMMIT").await?;
        Ok(())
    }

    /// Roll back the transaction.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidUsage` if the client is not connected to the
    /// backend that started the transaction.
    pub async fn rollback(self, client: &Client) -> Result<()> {
        self.check(client)?;
        client.simple_query("ROLLBACK").await?;
        Ok(())
    }

    /// Create a savepoint.
    pub async fn savepoint(&self, client: &Client, name: &str) -> Result<()> {
        self.check(client)?;
        client
            .simple_query(&format!("SAVEPOINT {}", quote_identifier(name)))
            .await?;
        Ok(())
    }

    /// Roll back to a savepoint, keeping the transaction open.
    pub async fn rollback_to(&self, client: &Client, name: &str) -> Result<()> {
        self.check(client)?;
        client
            .simple_query(&format!("ROLLBACK TO SAVEPOINT {}", quote_identifier(name)))
            .await?;
        Ok(())
    }

    /// Release a savepoint.
    pub async fn release(&self, client: &Client, name: &str) -> Result<()> {
        self.check(client)?;
        client
            .simple_query(&format!("RELEASE SAVEPOINT {}", quote_identifier(name)))
            .await?;
        Ok(())
    }
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_are_quoted() {
        assert_eq!(quote_identifier("sp1"), "\"sp1\"");
        assert_eq!(quote_identifier("a\"b"), "\"a\"\"b\"");
    }
}
