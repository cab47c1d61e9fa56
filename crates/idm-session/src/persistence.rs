//! User and group lifecycle.

use idm_core::error::require_non_blank;
use idm_core::Result;
use idm_model::{Attributes, Group, GroupKey, SearchCriteria, User};

use crate::event::{EventAction, EventPayload};
use crate::session::IdentitySession;

/// Creates, removes and finds users and groups.
#[derive(Debug, Clone, Copy)]
pub struct PersistenceManager<'s> {
    session: &'s IdentitySession,
}

impl<'s> PersistenceManager<'s> {
    pub(crate) const fn new(session: &'s IdentitySession) -> Self {
        Self { session }
    }

    // === Users ===

    /// Creates a user.
    ///
    /// ## Errors
    ///
    /// Returns `IllegalArgument` for a blank id and `AlreadyExists` if the
    /// user exists.
    pub async fn create_user(&self, id: &str) -> Result<User> {
        let user = User::new(id)?;
        let user_type = self.session.user_type();
        let payload = EventPayload::identity(EventAction::Created, user_type.name(), user.id());

        self.session
            .bracket(payload, async {
                self.session
                    .store()
                    .create_identity_object(user.id(), user_type, &Attributes::new())
                    .await
            })
            .await?;

        tracing::debug!(user = user.id(), "Created user");
        Ok(user)
    }

    /// Removes a user with its memberships and roles.
    ///
    /// ## Errors
    ///
    /// Returns `NotFound` if the user does not exist.
    pub async fn remove_user(&self, user: &User) -> Result<()> {
        let object = self.session.require_user(user).await?;
        let payload =
            EventPayload::identity(EventAction::Removed, object.object_type.name(), user.id());

        self.session
            .bracket(payload, self.session.store().remove_identity_object(&object))
            .await?;

        tracing::debug!(user = user.id(), "Removed user");
        Ok(())
    }

    /// Finds a user by id.
    ///
    /// ## Errors
    ///
    /// Returns `IllegalArgument` for a blank id and store failures.
    pub async fn find_user(&self, id: &str) -> Result<Option<User>> {
        let user = User::new(id)?;
        match self.session.user_object(&user).await? {
            Some(_) => Ok(Some(user)),
            None => Ok(None),
        }
    }

    /// Finds users matching criteria.
    ///
    /// ## Errors
    ///
    /// Returns `UnsupportedCriterium` if the store cannot honour the criteria.
    pub async fn find_users(&self, criteria: &SearchCriteria) -> Result<Vec<User>> {
        let objects = self
            .session
            .store()
            .find_identity_objects(self.session.user_type(), criteria)
            .await?;
        self.session.to_users(&objects)
    }

    /// Counts users.
    ///
    /// ## Errors
    ///
    /// Returns store failures.
    pub async fn user_count(&self) -> Result<usize> {
        self.session
            .store()
            .identity_object_count(self.session.user_type())
            .await
    }

    // === Groups ===

    /// Creates a group.
    ///
    /// ## Errors
    ///
    /// Returns `IllegalArgument` for blank or reserved names and types, and
    /// `AlreadyExists` if the group exists.
    pub async fn create_group(&self, name: &str, group_type: &str) -> Result<Group> {
        let group = Group::new(name, group_type)?;
        let identity_type = self.session.group_identity_type(group.group_type());
        let payload = EventPayload::identity(
            EventAction::Created,
            identity_type.name(),
            group.key().to_string(),
        );

        self.session
            .bracket(payload, async {
                self.session
                    .store()
                    .create_identity_object(group.name(), &identity_type, &Attributes::new())
                    .await
            })
            .await?;

        tracing::debug!(group = %group.key(), "Created group");
        Ok(group)
    }

    /// Removes a group with its memberships and roles.
    ///
    /// ## Errors
    ///
    /// Returns `NotFound` if the group does not exist.
    pub async fn remove_group(&self, group: &Group) -> Result<()> {
        let object = self.session.require_group(group).await?;
        let payload = EventPayload::identity(
            EventAction::Removed,
            object.object_type.name(),
            group.key().to_string(),
        );

        self.session
            .bracket(payload, self.session.store().remove_identity_object(&object))
            .await?;

        tracing::debug!(group = %group.key(), "Removed group");
        Ok(())
    }

    /// Finds a group by name and type.
    ///
    /// ## Errors
    ///
    /// Returns `IllegalArgument` for blank arguments and store failures.
    pub async fn find_group(&self, name: &str, group_type: &str) -> Result<Option<Group>> {
        let group = Group::new(name, group_type)?;
        match self.session.group_object(&group).await? {
            Some(_) => Ok(Some(group)),
            None => Ok(None),
        }
    }

    /// Finds a group by key.
    ///
    /// ## Errors
    ///
    /// Returns store failures.
    pub async fn find_group_by_key(&self, key: &GroupKey) -> Result<Option<Group>> {
        let group = key.to_group();
        match self.session.group_object(&group).await? {
            Some(_) => Ok(Some(group)),
            None => Ok(None),
        }
    }

    /// Finds a group by the text form of its key.
    ///
    /// ## Errors
    ///
    /// Returns `IllegalArgument` if the text is not a group key.
    pub async fn find_group_by_key_str(&self, key: &str) -> Result<Option<Group>> {
        let key: GroupKey = require_non_blank(key, "group key")?.parse()?;
        self.find_group_by_key(&key).await
    }

    /// Finds groups of a type matching criteria.
    ///
    /// ## Errors
    ///
    /// Returns `UnsupportedCriterium` if the store cannot honour the criteria.
    pub async fn find_groups(&self, group_type: &str, criteria: &SearchCriteria) -> Result<Vec<Group>> {
        require_non_blank(group_type, "group type")?;
        let objects = self
            .session
            .store()
            .find_identity_objects(&self.session.group_identity_type(group_type), criteria)
            .await?;
        self.session.to_groups(&objects)
    }

    /// Counts groups of a type.
    ///
    /// ## Errors
    ///
    /// Returns store failures.
    pub async fn group_count(&self, group_type: &str) -> Result<usize> {
        require_non_blank(group_type, "group type")?;
        self.session
            .store()
            .identity_object_count(&self.session.group_identity_type(group_type))
            .await
    }
}
