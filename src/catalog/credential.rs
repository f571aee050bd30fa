use super::{Catalog, scan_failed, write_failed};
use crate::context::Context;
use crate::error::{CatalogError, ResourceType};
use crate::model::Credential;
use crate::model::record::{CredentialInfo, decode_credential, encode_credential};

impl Catalog {
    pub async fn create_credential(
        &self,
        ctx: &Context,
        credential: &Credential,
    ) -> Result<(), CatalogError> {
        if credential.username.is_empty() {
            return Err(CatalogError::InvalidArgument("username is empty".into()));
        }
        let key = self.keys.credential(&credential.username);
        let value = encode_credential(&CredentialInfo {
            encrypted_password: credential.encrypted_password.as_str().to_owned(),
        })?;
        self.txn
            .save(ctx, &key, value)
            .await
            .map_err(|err| write_failed("create_credential", &key, err))
    }

    pub async fn get_credential(
        &self,
        ctx: &Context,
        username: &str,
    ) -> Result<Credential, CatalogError> {
        let key = self.keys.credential(username);
        let value = self
            .load_txn(ctx, ResourceType::Credential, &key)
            .await
            .inspect_err(|err| {
                tracing::warn!(key = %key, error = %err, "credential lookup failed");
            })?;
        let info = decode_credential(&key, &value)?;
        Ok(Credential::new(username, info.encrypted_password))
    }

    /// Idempotent: dropping an absent credential succeeds.
    pub async fn drop_credential(&self, ctx: &Context, username: &str) -> Result<(), CatalogError> {
        let key = self.keys.credential(username);
        self.txn
            .remove(ctx, &key)
            .await
            .map_err(|err| write_failed("drop_credential", &key, err))
    }

    /// Usernames taken from credential key suffixes. Keys with nothing after
    /// the credential prefix are skipped.
    pub async fn list_credentials(&self, ctx: &Context) -> Result<Vec<String>, CatalogError> {
        let prefix = self.keys.credential_prefix();
        let pairs = self
            .txn
            .load_with_prefix(ctx, prefix)
            .await
            .map_err(|err| scan_failed("list_credentials", prefix, err))?;

        let root = format!("{prefix}/");
        let mut usernames = Vec::with_capacity(pairs.len());
        for (key, _) in pairs {
            match key.strip_prefix(root.as_str()) {
                Some(username) if !username.is_empty() => usernames.push(username.to_string()),
                _ => tracing::warn!(key = %key, "no username in credential key"),
            }
        }
        Ok(usernames)
    }
}
