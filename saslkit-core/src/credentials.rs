use std::fmt;

use zeroize::Zeroizing;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialField {
    /// Authentication identity, the one owning the password.
    Username,
    /// Authorization identity, who to act as once authenticated.
    Authzid,
    Password,
    Realm,
}

/// A set of credential fields, used both for "asked" and "still missing".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NeededFields {
    pub username: bool,
    pub authzid: bool,
    pub password: bool,
    pub realm: bool,
}

impl NeededFields {
    pub fn is_empty(&self) -> bool {
        !(self.username || self.authzid || self.password || self.realm)
    }

    pub fn contains(&self, field: CredentialField) -> bool {
        match field {
            CredentialField::Username => self.username,
            CredentialField::Authzid => self.authzid,
            CredentialField::Password => self.password,
            CredentialField::Realm => self.realm,
        }
    }

    pub fn insert(&mut self, field: CredentialField) {
        self.set(field, true)
    }

    pub fn remove(&mut self, field: CredentialField) {
        self.set(field, false)
    }

    fn set(&mut self, field: CredentialField, v: bool) {
        match field {
            CredentialField::Username => self.username = v,
            CredentialField::Authzid => self.authzid = v,
            CredentialField::Password => self.password = v,
            CredentialField::Realm => self.realm = v,
        }
    }

    pub fn fields(&self) -> Vec<CredentialField> {
        [
            CredentialField::Username,
            CredentialField::Authzid,
            CredentialField::Password,
            CredentialField::Realm,
        ]
        .into_iter()
        .filter(|f| self.contains(*f))
        .collect()
    }
}

impl FromIterator<CredentialField> for NeededFields {
    fn from_iter<I: IntoIterator<Item = CredentialField>>(iter: I) -> Self {
        let mut set = Self::default();
        for f in iter {
            set.insert(f);
        }
        set
    }
}

/// The subset of credentials a caller provides in one go.
#[derive(Clone, Default)]
pub struct CredentialUpdate {
    pub username: Option<String>,
    pub authzid: Option<String>,
    pub password: Option<Zeroizing<String>>,
    pub realm: Option<String>,
}

impl CredentialUpdate {
    pub fn username(mut self, v: impl Into<String>) -> Self {
        self.username = Some(v.into());
        self
    }

    pub fn authzid(mut self, v: impl Into<String>) -> Self {
        self.authzid = Some(v.into());
        self
    }

    pub fn password(mut self, v: impl Into<String>) -> Self {
        self.password = Some(Zeroizing::new(v.into()));
        self
    }

    pub fn realm(mut self, v: impl Into<String>) -> Self {
        self.realm = Some(v.into());
        self
    }
}

impl fmt::Debug for CredentialUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialUpdate")
            .field("username", &self.username)
            .field("authzid", &self.authzid)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("realm", &self.realm)
            .finish()
    }
}

/// Credentials known so far, and the ones a mechanism asked for.
///
/// A field the mechanism asked for stays needed until the caller supplies it:
/// it is never replaced by an empty or default value.
#[derive(Clone, Default)]
pub struct CredentialSet {
    username: Option<String>,
    authzid: Option<String>,
    password: Option<Zeroizing<String>>,
    realm: Option<String>,
    needed: NeededFields,
}

impl CredentialSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge what the caller now provides. Only supplied fields stop being needed.
    pub fn supply(&mut self, update: CredentialUpdate) {
        if let Some(v) = update.username {
            self.username = Some(v);
            self.needed.remove(CredentialField::Username);
        }
        if let Some(v) = update.authzid {
            self.authzid = Some(v);
            self.needed.remove(CredentialField::Authzid);
        }
        if let Some(v) = update.password {
            self.password = Some(v);
            self.needed.remove(CredentialField::Password);
        }
        if let Some(v) = update.realm {
            self.realm = Some(v);
            self.needed.remove(CredentialField::Realm);
        }
    }

    /// Record that a mechanism asked for these fields.
    pub fn mark_needed(&mut self, fields: NeededFields) {
        for f in fields.fields() {
            self.needed.insert(f);
        }
    }

    /// Fields asked for and not yet supplied.
    pub fn needed(&self) -> NeededFields {
        self.needed
    }

    /// Fields asked for that are still unknown.
    pub fn missing(&self) -> NeededFields {
        self.needed
            .fields()
            .into_iter()
            .filter(|f| !self.is_known(*f))
            .collect()
    }

    pub fn is_known(&self, field: CredentialField) -> bool {
        match field {
            CredentialField::Username => self.username.is_some(),
            CredentialField::Authzid => self.authzid.is_some(),
            CredentialField::Password => self.password.is_some(),
            CredentialField::Realm => self.realm.is_some(),
        }
    }

    pub fn get(&self, field: CredentialField) -> Option<&str> {
        match field {
            CredentialField::Username => self.username.as_deref(),
            CredentialField::Authzid => self.authzid.as_deref(),
            CredentialField::Password => self.password.as_ref().map(|p| p.as_str()),
            CredentialField::Realm => self.realm.as_deref(),
        }
    }

    pub fn username(&self) -> Option<&str> {
        self.get(CredentialField::Username)
    }

    pub fn authzid(&self) -> Option<&str> {
        self.get(CredentialField::Authzid)
    }

    pub fn password(&self) -> Option<&str> {
        self.get(CredentialField::Password)
    }

    pub fn realm(&self) -> Option<&str> {
        self.get(CredentialField::Realm)
    }

    /// Forget everything, the password buffer is wiped.
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

impl fmt::Debug for CredentialSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialSet")
            .field("username", &self.username)
            .field("authzid", &self.authzid)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("realm", &self.realm)
            .field("needed", &self.needed)
            .finish()
    }
}
