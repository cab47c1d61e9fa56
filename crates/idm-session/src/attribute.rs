//! Attributes and credentials of users and groups.

use idm_core::error::require_non_blank;
use idm_core::{Error, Result};
use idm_model::{Attributes, Group, IdentityObject, User};

use crate::event::{EventAction, EventPayload};
use crate::session::IdentitySession;

/// A user or a group whose attributes are read or written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subject<'a> {
    /// A user.
    User(&'a User),
    /// A group.
    Group(&'a Group),
}

impl<'a> From<&'a User> for Subject<'a> {
    fn from(user: &'a User) -> Self {
        Self::User(user)
    }
}

impl<'a> From<&'a Group> for Subject<'a> {
    fn from(group: &'a Group) -> Self {
        Self::Group(group)
    }
}

impl Subject<'_> {
    fn label(&self) -> String {
        match self {
            Self::User(user) => user.id().to_string(),
            Self::Group(group) => group.key().to_string(),
        }
    }
}

/// Reads and writes attributes and password credentials.
#[derive(Debug, Clone, Copy)]
pub struct AttributesManager<'s> {
    session: &'s IdentitySession,
}

impl<'s> AttributesManager<'s> {
    pub(crate) const fn new(session: &'s IdentitySession) -> Self {
        Self { session }
    }

    /// Returns every attribute of a user or group.
    ///
    /// ## Errors
    ///
    /// Returns `NotFound` if the subject does not exist.
    pub async fn attributes<'a>(&self, subject: impl Into<Subject<'a>>) -> Result<Attributes> {
        let object = self.require(subject.into()).await?;
        self.session.store().attributes(&object).await
    }

    /// Returns one attribute of a user or group.
    ///
    /// ## Errors
    ///
    /// Returns `NotFound` if the subject does not exist.
    pub async fn attribute<'a>(
        &self,
        subject: impl Into<Subject<'a>>,
        name: &str,
    ) -> Result<Option<Vec<String>>> {
        require_non_blank(name, "attribute name")?;
        let object = self.require(subject.into()).await?;
        self.session.store().attribute(&object, name).await
    }

    /// Adds attribute values, keeping the values already stored.
    ///
    /// ## Errors
    ///
    /// Returns `NotFound` if the subject does not exist and
    /// `IllegalArgument` for read-only attributes.
    pub async fn add_attributes<'a>(
        &self,
        subject: impl Into<Subject<'a>>,
        attributes: &Attributes,
    ) -> Result<()> {
        let subject = subject.into();
        let object = self.require(subject).await?;
        let payload = self.updated(&object, subject);
        self.session
            .bracket(payload, self.session.store().add_attributes(&object, attributes))
            .await
    }

    /// Replaces attribute values.
    ///
    /// ## Errors
    ///
    /// Returns `NotFound` if the subject does not exist and
    /// `IllegalArgument` for read-only attributes.
    pub async fn update_attributes<'a>(
        &self,
        subject: impl Into<Subject<'a>>,
        attributes: &Attributes,
    ) -> Result<()> {
        let subject = subject.into();
        let object = self.require(subject).await?;
        let payload = self.updated(&object, subject);
        self.session
            .bracket(payload, self.session.store().update_attributes(&object, attributes))
            .await
    }

    /// Removes attributes.
    ///
    /// ## Errors
    ///
    /// Returns `NotFound` if the subject does not exist.
    pub async fn remove_attributes<'a>(
        &self,
        subject: impl Into<Subject<'a>>,
        names: &[String],
    ) -> Result<()> {
        let subject = subject.into();
        let object = self.require(subject).await?;
        let payload = self.updated(&object, subject);
        self.session
            .bracket(payload, self.session.store().remove_attributes(&object, names))
            .await
    }

    /// Finds the user holding a unique attribute value.
    ///
    /// ## Errors
    ///
    /// Returns `DataInconsistency` if several users hold the value.
    pub async fn find_user_by_unique_attribute(&self, name: &str, value: &str) -> Result<Option<User>> {
        require_non_blank(name, "attribute name")?;
        let found = self
            .session
            .store()
            .find_identity_object_by_unique_attribute(self.session.user_type(), name, value)
            .await?;
        found.map(|o| self.session.to_user(&o)).transpose()
    }

    /// Finds the group of a type holding a unique attribute value.
    ///
    /// ## Errors
    ///
    /// Returns `DataInconsistency` if several groups hold the value.
    pub async fn find_group_by_unique_attribute(
        &self,
        group_type: &str,
        name: &str,
        value: &str,
    ) -> Result<Option<Group>> {
        require_non_blank(group_type, "group type")?;
        require_non_blank(name, "attribute name")?;
        let found = self
            .session
            .store()
            .find_identity_object_by_unique_attribute(
                &self.session.group_identity_type(group_type),
                name,
                value,
            )
            .await?;
        found.map(|o| self.session.to_group(&o)).transpose()
    }

    /// Checks a user's password.
    ///
    /// A missing user never validates.
    ///
    /// ## Errors
    ///
    /// Returns `OperationNotSupported` if the store keeps no credentials for
    /// users.
    pub async fn validate_password(&self, user: &User, password: &str) -> Result<bool> {
        self.check_credentials()?;
        match self.session.user_object(user).await? {
            Some(object) => self.session.store().validate_credential(&object, password).await,
            None => Ok(false),
        }
    }

    /// Replaces a user's password.
    ///
    /// ## Errors
    ///
    /// Returns `NotFound` if the user does not exist and
    /// `OperationNotSupported` if the store keeps no credentials for users.
    pub async fn update_password(&self, user: &User, password: &str) -> Result<()> {
        self.check_credentials()?;
        if password.is_empty() {
            return Err(Error::illegal_argument("password must not be empty"));
        }
        let object = self.session.require_user(user).await?;
        let payload = EventPayload::identity(EventAction::Updated, object.object_type.name(), user.id());
        self.session
            .bracket(payload, self.session.store().update_credential(&object, password))
            .await?;

        tracing::debug!(user = user.id(), "Updated password");
        Ok(())
    }

    fn check_credentials(&self) -> Result<()> {
        let user_type = self.session.user_type();
        if self.session.store().features().is_credential_supported(user_type) {
            Ok(())
        } else {
            Err(Error::not_supported(format!("credentials for identity type '{user_type}'")))
        }
    }

    fn updated(&self, object: &IdentityObject, subject: Subject<'_>) -> EventPayload {
        EventPayload::identity(EventAction::Updated, object.object_type.name(), subject.label())
    }

    async fn require(&self, subject: Subject<'_>) -> Result<IdentityObject> {
        match subject {
            Subject::User(user) => self.session.require_user(user).await,
            Subject::Group(group) => self.session.require_group(group).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use idm_core::IdentityConfig;
    use idm_store::MemoryIdentityStore;

    use super::*;

    fn session() -> IdentitySession {
        let store = MemoryIdentityStore::for_types("mem", "USER", &["ORG"]);
        IdentitySession::new(Arc::new(store), IdentityConfig::default())
    }

    fn attrs(pairs: &[(&str, &str)]) -> Attributes {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), vec![(*v).to_string()]))
            .collect()
    }

    #[tokio::test]
    async fn user_and_group_attributes() {
        let session = session();
        let alice = session.persistence().create_user("alice").await.unwrap();
        let acme = session.persistence().create_group("acme", "ORG").await.unwrap();
        let manager = session.attributes();

        manager
            .add_attributes(&alice, &attrs(&[("mail", "alice@example.com")]))
            .await
            .unwrap();
        manager
            .add_attributes(&alice, &attrs(&[("mail", "a@example.com")]))
            .await
            .unwrap();
        assert_eq!(
            manager.attribute(&alice, "mail").await.unwrap(),
            Some(vec!["alice@example.com".to_string(), "a@example.com".to_string()])
        );

        manager
            .update_attributes(&alice, &attrs(&[("mail", "new@example.com")]))
            .await
            .unwrap();
        assert_eq!(
            manager.attribute(&alice, "mail").await.unwrap(),
            Some(vec!["new@example.com".to_string()])
        );

        manager
            .update_attributes(&acme, &attrs(&[("city", "Bern")]))
            .await
            .unwrap();
        manager.remove_attributes(&acme, &["city".to_string()]).await.unwrap();
        assert!(manager.attributes(&acme).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unique_attribute_lookup() {
        let session = session();
        let persistence = session.persistence();
        let manager = session.attributes();
        let alice = persistence.create_user("alice").await.unwrap();
        let bob = persistence.create_user("bob").await.unwrap();
        manager.add_attributes(&alice, &attrs(&[("mail", "a@x")])).await.unwrap();
        manager.add_attributes(&bob, &attrs(&[("mail", "b@x")])).await.unwrap();

        assert_eq!(
            manager.find_user_by_unique_attribute("mail", "b@x").await.unwrap(),
            Some(bob.clone())
        );
        assert!(manager
            .find_user_by_unique_attribute("mail", "nobody@x")
            .await
            .unwrap()
            .is_none());

        manager.add_attributes(&alice, &attrs(&[("mail", "b@x")])).await.unwrap();
        assert!(matches!(
            manager.find_user_by_unique_attribute("mail", "b@x").await,
            Err(Error::DataInconsistency(_))
        ));
    }

    #[tokio::test]
    async fn passwords() {
        let session = session();
        let alice = session.persistence().create_user("alice").await.unwrap();
        let manager = session.attributes();

        assert!(!manager.validate_password(&alice, "secret").await.unwrap());
        manager.update_password(&alice, "secret").await.unwrap();
        assert!(manager.validate_password(&alice, "secret").await.unwrap());
        assert!(!manager.validate_password(&alice, "wrong").await.unwrap());

        let ghost = User::new("ghost").unwrap();
        assert!(!manager.validate_password(&ghost, "secret").await.unwrap());
        assert!(matches!(
            manager.update_password(&ghost, "secret").await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            manager.update_password(&alice, "").await,
            Err(Error::IllegalArgument(_))
        ));
    }

    #[tokio::test]
    async fn missing_subjects_are_not_found() {
        let session = session();
        let ghost = Group::new("ghost", "ORG").unwrap();
        assert!(matches!(
            session.attributes().attributes(&ghost).await,
            Err(Error::NotFound(_))
        ));
    }
}
