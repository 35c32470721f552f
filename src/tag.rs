//! Canonical cache tags.
//!
//! A tag names a scope of resource data: everything of a kind (`global`), one
//! user's slice of it (`user`), or a single entity (`id`). Reads are stored under
//! a set of tags and writes drop every entry carrying any of the tags they touch.
//!
//! The textual form is `<kind>:<scope-kind>[:<scope-value>]`:
//!
//! ```ignore
//! use tag_cache::{ResourceKind, global_tag, user_tag};
//!
//! assert_eq!(global_tag(ResourceKind::Products).to_string(), "products:global");
//! assert_eq!(
//!     user_tag("u_42", ResourceKind::Products)?.to_string(),
//!     "products:user:u_42"
//! );
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::error::CacheError;

/// A family of cacheable resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceKind {
    Products,
    ProductViews,
    Subscription,
    Countries,
    CountryGroups,
    Customization,
}

/// Which scopes a resource kind is cached and invalidated under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackedScopes {
    pub global: bool,
    pub user: bool,
    pub id: bool,
}

impl TrackedScopes {
    const ALL: TrackedScopes = TrackedScopes {
        global: true,
        user: true,
        id: true,
    };

    const GLOBAL_ONLY: TrackedScopes = TrackedScopes {
        global: true,
        user: false,
        id: false,
    };

    /// Whether tags of the given scope kind are tracked.
    pub fn tracks(&self, scope: ScopeKind) -> bool {
        match scope {
            ScopeKind::Global => self.global,
            ScopeKind::User => self.user,
            ScopeKind::Entity => self.id,
        }
    }
}

impl ResourceKind {
    /// Every resource kind, in declaration order.
    pub const ALL: [ResourceKind; 6] = [
        ResourceKind::Products,
        ResourceKind::ProductViews,
        ResourceKind::Subscription,
        ResourceKind::Countries,
        ResourceKind::CountryGroups,
        ResourceKind::Customization,
    ];

    /// Canonical name used in the tag text form.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Products => "products",
            ResourceKind::ProductViews => "productViews",
            ResourceKind::Subscription => "subscription",
            ResourceKind::Countries => "countries",
            ResourceKind::CountryGroups => "countryGroups",
            ResourceKind::Customization => "customization",
        }
    }

    /// The scope table. Reads may only be tagged with tracked scopes, and
    /// invalidation only computes tracked scopes, so both sides read the same row.
    pub fn tracked_scopes(&self) -> TrackedScopes {
        match self {
            ResourceKind::Products
            | ResourceKind::ProductViews
            | ResourceKind::Subscription
            | ResourceKind::Customization => TrackedScopes::ALL,
            // Reference data shared by every user.
            ResourceKind::Countries | ResourceKind::CountryGroups => TrackedScopes::GLOBAL_ONLY,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResourceKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| CacheError::InvalidTag(s.to_string()))
    }
}

/// The kind of scope, without its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeKind {
    Global,
    User,
    Entity,
}

impl ScopeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeKind::Global => "global",
            ScopeKind::User => "user",
            ScopeKind::Entity => "id",
        }
    }
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The slice of a resource kind a tag covers.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Scope {
    Global,
    User(String),
    Entity(String),
}

impl Scope {
    pub fn kind(&self) -> ScopeKind {
        match self {
            Scope::Global => ScopeKind::Global,
            Scope::User(_) => ScopeKind::User,
            Scope::Entity(_) => ScopeKind::Entity,
        }
    }
}

/// A cache tag. Two tags are equal iff kind and scope match exactly.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct CacheTag {
    kind: ResourceKind,
    scope: Scope,
}

impl CacheTag {
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }
}

/// Tag covering every instance of `kind`.
pub fn global_tag(kind: ResourceKind) -> CacheTag {
    CacheTag {
        kind,
        scope: Scope::Global,
    }
}

/// Tag covering the slice of `kind` owned by `user_id`.
pub fn user_tag(user_id: &str, kind: ResourceKind) -> Result<CacheTag, CacheError> {
    if user_id.is_empty() {
        return Err(CacheError::InvalidScope {
            kind,
            scope: ScopeKind::User,
        });
    }
    Ok(CacheTag {
        kind,
        scope: Scope::User(user_id.to_string()),
    })
}

/// Tag covering the single entity `id` of `kind`.
pub fn id_tag(id: &str, kind: ResourceKind) -> Result<CacheTag, CacheError> {
    if id.is_empty() {
        return Err(CacheError::InvalidScope {
            kind,
            scope: ScopeKind::Entity,
        });
    }
    Ok(CacheTag {
        kind,
        scope: Scope::Entity(id.to_string()),
    })
}

impl fmt::Display for CacheTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.scope {
            Scope::Global => write!(f, "{}:{}", self.kind, ScopeKind::Global),
            Scope::User(value) => write!(f, "{}:{}:{}", self.kind, ScopeKind::User, value),
            Scope::Entity(value) => write!(f, "{}:{}:{}", self.kind, ScopeKind::Entity, value),
        }
    }
}

impl FromStr for CacheTag {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CacheError::InvalidTag(s.to_string());

        // The scope value is last, so it may contain ':' itself.
        let mut parts = s.splitn(3, ':');
        let kind: ResourceKind = parts
            .next()
            .ok_or_else(invalid)?
            .parse()
            .map_err(|_| invalid())?;
        let scope_kind = parts.next().ok_or_else(invalid)?;
        let value = parts.next();

        match (scope_kind, value) {
            ("global", None) => Ok(global_tag(kind)),
            ("user", Some(value)) => user_tag(value, kind).map_err(|_| invalid()),
            ("id", Some(value)) => id_tag(value, kind).map_err(|_| invalid()),
            _ => Err(invalid()),
        }
    }
}

impl From<CacheTag> for String {
    fn from(tag: CacheTag) -> Self {
        tag.to_string()
    }
}

impl TryFrom<String> for CacheTag {
    type Error = CacheError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// The set of tags protecting one cached read.
///
/// Only tags whose scope is tracked for their kind may be added.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagSet {
    tags: BTreeSet<CacheTag>,
}

impl TagSet {
    pub fn new() -> Self {
        TagSet::default()
    }

    /// Build a set from tags, rejecting any scope the kind does not track.
    pub fn try_from_tags<I>(tags: I) -> Result<Self, CacheError>
    where
        I: IntoIterator<Item = CacheTag>,
    {
        let mut set = TagSet::new();
        for tag in tags {
            set.insert(tag)?;
        }
        Ok(set)
    }

    /// Add a tag. Returns whether it was newly inserted.
    pub fn insert(&mut self, tag: CacheTag) -> Result<bool, CacheError> {
        let scope = tag.scope.kind();
        if !tag.kind.tracked_scopes().tracks(scope) {
            return Err(CacheError::ScopeNotTracked {
                kind: tag.kind,
                scope,
            });
        }
        Ok(self.tags.insert(tag))
    }

    pub fn contains(&self, tag: &CacheTag) -> bool {
        self.tags.contains(tag)
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CacheTag> {
        self.tags.iter()
    }

    pub(crate) fn to_set(&self) -> BTreeSet<CacheTag> {
        self.tags.clone()
    }
}
