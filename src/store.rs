use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{ObjectCannedAcl, Permission};
use aws_sdk_s3::Client;
use tracing::debug;

use crate::errors::{ExportError, Result};

const ALL_USERS_GROUP: &str = "http://acs.amazonaws.com/groups/global/AllUsers";

/// Visibility policy for written objects. The caller decides the policy;
/// the store only applies it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    PublicRead,
    Private,
}

impl Visibility {
    fn canned_acl(&self) -> ObjectCannedAcl {
        match self {
            Visibility::PublicRead => ObjectCannedAcl::PublicRead,
            Visibility::Private => ObjectCannedAcl::Private,
        }
    }
}

/// Thin client over the open data bucket.
///
/// Every method is a single S3 call; there is no client-side locking and no
/// retry beyond what the SDK performs itself.
#[derive(Clone)]
pub struct Storage {
    client: Client,
    bucket: String,
}

impl Storage {
    pub fn new(client: Client, bucket: impl Into<String>) -> Self {
        Storage {
            client,
            bucket: bucket.into(),
        }
    }

    /// Builds a client from the ambient AWS environment (profile, instance
    /// role or function role).
    pub async fn from_env(bucket: impl Into<String>) -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Storage::new(Client::new(&config), bucket)
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Writes an object with the requested visibility.
    pub async fn put(&self, key: &str, body: Vec<u8>, visibility: Visibility) -> Result<()> {
        debug!(bucket = %self.bucket, key, bytes = body.len(), "Putting object");

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .acl(visibility.canned_acl())
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| ExportError::Storage(DisplayErrorContext(&e).to_string()))?;

        Ok(())
    }

    /// Copies an object within the bucket, applying the requested visibility
    /// to the new object (a plain copy would silently reset it).
    pub async fn copy(&self, source_key: &str, dest_key: &str, visibility: Visibility) -> Result<()> {
        debug!(bucket = %self.bucket, source_key, dest_key, "Copying object");

        let copy_source = format!("{}/{}", self.bucket, source_key);

        self.client
            .copy_object()
            .bucket(&self.bucket)
            .copy_source(&copy_source)
            .key(dest_key)
            .acl(visibility.canned_acl())
            .send()
            .await
            .map_err(|e| ExportError::Storage(DisplayErrorContext(&e).to_string()))?;

        Ok(())
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        debug!(bucket = %self.bucket, key, "Deleting object");

        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| ExportError::Storage(DisplayErrorContext(&e).to_string()))?;

        Ok(())
    }

    /// Checks whether a key exists in the bucket.
    pub async fn exists(&self, key: &str) -> Result<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                let message = DisplayErrorContext(&e).to_string();
                if e.into_service_error().is_not_found() {
                    Ok(false)
                } else {
                    Err(ExportError::Storage(message))
                }
            }
        }
    }

    /// Reads the object's ACL and reports whether it matches the requested
    /// visibility.
    pub async fn visibility_matches(&self, key: &str, visibility: Visibility) -> Result<bool> {
        let acl = self
            .client
            .get_object_acl()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| ExportError::Storage(DisplayErrorContext(&e).to_string()))?;

        let public = acl.grants().iter().any(|grant| {
            let to_all_users = grant
                .grantee()
                .and_then(|grantee| grantee.uri())
                .map(|uri| uri == ALL_USERS_GROUP)
                .unwrap_or(false);
            let readable = matches!(
                grant.permission(),
                Some(Permission::Read) | Some(Permission::FullControl)
            );
            to_all_users && readable
        });

        Ok(match visibility {
            Visibility::PublicRead => public,
            Visibility::Private => !public,
        })
    }

    /// Re-applies the requested visibility to an existing object.
    pub async fn set_visibility(&self, key: &str, visibility: Visibility) -> Result<()> {
        debug!(bucket = %self.bucket, key, ?visibility, "Updating object ACL");

        self.client
            .put_object_acl()
            .bucket(&self.bucket)
            .key(key)
            .acl(visibility.canned_acl())
            .send()
            .await
            .map_err(|e| ExportError::Storage(DisplayErrorContext(&e).to_string()))?;

        Ok(())
    }
}
