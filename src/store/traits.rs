//! `UserStore` trait: the persistence seam for user records.

use async_trait::async_trait;

use crate::error::DatabaseError;
use crate::onboarding::model::{NewUser, UserRecord};

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Look a user up by the identity the auth proxy issued.
    async fn get_user(&self, external_id: &str) -> Result<Option<UserRecord>, DatabaseError>;

    /// Insert a new user. Fails with `Constraint` if the external id exists.
    async fn create_user(&self, user: NewUser) -> Result<UserRecord, DatabaseError>;

    /// Return the existing user or create one that is starting onboarding.
    async fn get_or_create(&self, external_id: &str) -> Result<UserRecord, DatabaseError> {
        if let Some(user) = self.get_user(external_id).await? {
            return Ok(user);
        }
        match self.create_user(NewUser::onboarding(external_id)).await {
            Ok(user) => Ok(user),
            // A concurrent first request may have created the row.
            Err(DatabaseError::Constraint(_)) => {
                self.get_user(external_id)
                    .await?
                    .ok_or_else(|| DatabaseError::NotFound {
                        entity: "user".to_string(),
                        id: external_id.to_string(),
                    })
            }
            Err(e) => Err(e),
        }
    }
}
