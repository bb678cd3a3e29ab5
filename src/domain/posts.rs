//! Post identity and version numbering.
//!
//! A post is identified by its owner and title. Each ingest creates a new
//! numbered version; exactly one version per title is active and served.
//! Titles are stored with spaces, while endpoint paths and content keys use
//! the underscore form.

use std::fmt;

use serde::{Serialize, Serializer};
use time::OffsetDateTime;

use super::entities::VersionRecord;
use super::error::DomainError;

/// Characters a title may not contain. Underscore is reserved because it
/// stands in for spaces in endpoint paths and content keys.
pub const FORBIDDEN_TITLE_CHARS: &[char] = &['\\', '/', ':', '*', '?', '"', '<', '>', '|', '_'];

/// Username owning a set of posts.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Owner(String);

impl Owner {
    pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(DomainError::validation("owner must not be empty"));
        }
        if trimmed
            .chars()
            .any(|ch| ch == '/' || ch == '_' || ch.is_whitespace())
        {
            return Err(DomainError::validation(format!(
                "owner `{trimmed}` contains a reserved character"
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub(crate) fn from_stored(value: String) -> Self {
        Self(value)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Human title of a post, unique per owner.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct PostTitle(String);

impl PostTitle {
    /// Validates a title supplied by an author.
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(DomainError::validation("title must not be empty"));
        }
        if let Some(ch) = trimmed.chars().find(|ch| FORBIDDEN_TITLE_CHARS.contains(ch)) {
            return Err(DomainError::validation(format!(
                "title contains invalid character `{ch}`"
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Resolves the underscore form used in request paths back to a title.
    pub fn from_path_segment(segment: &str) -> Result<Self, DomainError> {
        Self::parse(&segment.replace('_', " "))
    }

    pub(crate) fn from_stored(value: String) -> Self {
        Self(value)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Underscore form used in endpoint paths and content keys.
    pub fn path_segment(&self) -> String {
        self.0.replace(' ', "_")
    }
}

impl fmt::Display for PostTitle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Positive version number, persisted as its decimal string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VersionNumber(u32);

impl VersionNumber {
    pub const FIRST: Self = Self(1);

    pub fn new(value: u32) -> Option<Self> {
        (value >= 1).then_some(Self(value))
    }

    /// Parses a stored version string. Anything but a positive decimal integer
    /// is an invariant violation.
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let value: u32 = raw
            .trim()
            .parse()
            .map_err(|_| DomainError::invariant(format!("malformed version number `{raw}`")))?;
        Self::new(value)
            .ok_or_else(|| DomainError::invariant(format!("version number `{raw}` is not positive")))
    }

    pub fn get(self) -> u32 {
        self.0
    }

    pub fn next(self) -> Result<Self, DomainError> {
        self.0
            .checked_add(1)
            .map(Self)
            .ok_or_else(|| DomainError::invariant("version number overflow"))
    }
}

impl fmt::Display for VersionNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for VersionNumber {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Computes the number for the next version of a title: one more than the
/// maximum existing number, or 1 when there is none. A single malformed
/// existing number aborts the computation.
pub fn next_version<'a, I>(existing: I) -> Result<VersionNumber, DomainError>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut max: Option<VersionNumber> = None;
    for raw in existing {
        let parsed = VersionNumber::parse(raw)?;
        max = Some(max.map_or(parsed, |current| current.max(parsed)));
    }
    match max {
        Some(current) => current.next(),
        None => Ok(VersionNumber::FIRST),
    }
}

/// A single numbered version of a post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostVersion {
    pub owner: Owner,
    pub title: PostTitle,
    pub version: VersionNumber,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub is_active: bool,
    pub content_ref: String,
}

impl PostVersion {
    pub fn from_record(record: VersionRecord) -> Result<Self, DomainError> {
        let version = VersionNumber::parse(&record.version)?;
        Ok(Self {
            owner: Owner::from_stored(record.owner),
            title: PostTitle::from_stored(record.title),
            version,
            created_at: record.created_at,
            is_active: record.is_active,
            content_ref: record.content_ref,
        })
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint::for_post(&self.owner, &self.title)
    }
}

/// All versions of one title, ordered by version number.
#[derive(Debug, Clone, Serialize)]
pub struct PostVersions {
    pub owner: Owner,
    pub title: PostTitle,
    pub versions: Vec<PostVersion>,
}

impl PostVersions {
    /// Groups records of one title. Returns `Ok(None)` when there are none.
    pub fn from_records(records: Vec<VersionRecord>) -> Result<Option<Self>, DomainError> {
        let mut versions = records
            .into_iter()
            .map(PostVersion::from_record)
            .collect::<Result<Vec<_>, _>>()?;
        versions.sort_by_key(|version| version.version);

        let Some(first) = versions.first() else {
            return Ok(None);
        };
        let owner = first.owner.clone();
        let title = first.title.clone();
        if versions
            .iter()
            .any(|version| version.owner != owner || version.title != title)
        {
            return Err(DomainError::invariant("versions span more than one title"));
        }

        Ok(Some(Self {
            owner,
            title,
            versions,
        }))
    }

    pub fn latest(&self) -> Option<&PostVersion> {
        self.versions.last()
    }

    pub fn active(&self) -> Option<&PostVersion> {
        self.versions.iter().find(|version| version.is_active)
    }

    pub fn get(&self, version: VersionNumber) -> Option<&PostVersion> {
        self.versions.iter().find(|entry| entry.version == version)
    }
}

/// Public path of a post: `/{owner}/{title with underscores}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint(String);

impl Endpoint {
    pub fn for_post(owner: &Owner, title: &PostTitle) -> Self {
        Self(format!("/{}/{}", owner.as_str(), title.path_segment()))
    }

    /// Prefix shared by every endpoint of an owner.
    pub fn owner_prefix(owner: &Owner) -> String {
        format!("/{}/", owner.as_str())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentKind {
    Html,
    Markdown,
}

impl ContentKind {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Markdown => "md",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Self::Html => "text/html",
            Self::Markdown => "text/markdown",
        }
    }
}

/// Content-store object key: `{owner}_{title with underscores}_{version}.{ext}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentKey {
    key: String,
    kind: ContentKind,
}

impl ContentKey {
    pub fn new(owner: &Owner, title: &PostTitle, version: VersionNumber, kind: ContentKind) -> Self {
        let key = format!(
            "{}_{}_{}.{}",
            owner.as_str(),
            title.path_segment(),
            version,
            kind.extension()
        );
        Self { key, kind }
    }

    pub fn html(owner: &Owner, title: &PostTitle, version: VersionNumber) -> Self {
        Self::new(owner, title, version, ContentKind::Html)
    }

    pub fn markdown(owner: &Owner, title: &PostTitle, version: VersionNumber) -> Self {
        Self::new(owner, title, version, ContentKind::Markdown)
    }

    pub fn as_str(&self) -> &str {
        &self.key
    }

    pub fn kind(&self) -> ContentKind {
        self.kind
    }
}

impl fmt::Display for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn record(version: &str, is_active: bool) -> VersionRecord {
        VersionRecord {
            owner: "alice".to_string(),
            title: "Hello World".to_string(),
            version: version.to_string(),
            created_at: datetime!(2024-05-01 10:00 UTC),
            is_active,
            content_ref: format!("alice_Hello_World_{version}.html"),
        }
    }

    #[test]
    fn next_version_starts_at_one() {
        let next = next_version(std::iter::empty()).expect("empty history");
        assert_eq!(next, VersionNumber::FIRST);
    }

    #[test]
    fn next_version_uses_numeric_maximum() {
        let next = next_version(["2", "10", "9"]).expect("numeric history");
        assert_eq!(next.get(), 11);
    }

    #[test]
    fn next_version_rejects_malformed_history() {
        let err = next_version(["1", "v2"]).expect_err("malformed history");
        assert!(matches!(err, DomainError::Invariant { .. }));
    }

    #[test]
    fn version_zero_is_invalid() {
        assert!(VersionNumber::parse("0").is_err());
        assert!(VersionNumber::new(0).is_none());
    }

    #[test]
    fn title_rejects_reserved_characters() {
        for raw in ["a/b", "a_b", "what?", "x|y", "\"quoted\"", "   "] {
            assert!(PostTitle::parse(raw).is_err(), "accepted `{raw}`");
        }
        assert_eq!(PostTitle::parse("  My First Post ").unwrap().as_str(), "My First Post");
    }

    #[test]
    fn endpoint_and_content_keys_use_underscores() {
        let owner = Owner::new("alice").unwrap();
        let title = PostTitle::parse("My First Post").unwrap();
        let version = VersionNumber::new(3).unwrap();

        assert_eq!(Endpoint::for_post(&owner, &title).as_str(), "/alice/My_First_Post");
        assert_eq!(
            ContentKey::html(&owner, &title, version).as_str(),
            "alice_My_First_Post_3.html"
        );
        assert_eq!(
            ContentKey::markdown(&owner, &title, version).as_str(),
            "alice_My_First_Post_3.md"
        );
        assert_eq!(PostTitle::from_path_segment("My_First_Post").unwrap(), title);
    }

    #[test]
    fn owner_rejects_path_separators() {
        assert!(Owner::new("al/ice").is_err());
        assert!(Owner::new("al_ice").is_err());
        assert!(Owner::new("").is_err());
    }

    #[test]
    fn versions_are_ordered_and_expose_active() {
        let versions = PostVersions::from_records(vec![
            record("10", false),
            record("2", true),
            record("1", false),
        ])
        .expect("valid records")
        .expect("non-empty");

        let numbers: Vec<u32> = versions.versions.iter().map(|v| v.version.get()).collect();
        assert_eq!(numbers, vec![1, 2, 10]);
        assert_eq!(versions.latest().map(|v| v.version.get()), Some(10));
        assert_eq!(versions.active().map(|v| v.version.get()), Some(2));
    }

    #[test]
    fn empty_records_yield_none() {
        assert!(PostVersions::from_records(Vec::new()).unwrap().is_none());
    }

    #[test]
    fn content_keys_deduplicate_in_sets() {
        let owner = Owner::new("alice").unwrap();
        let title = PostTitle::parse("Trip Notes").unwrap();
        let first = VersionNumber::FIRST;
        let keys: std::collections::HashSet<ContentKey> = [
            ContentKey::html(&owner, &title, first),
            ContentKey::html(&owner, &title, first),
            ContentKey::markdown(&owner, &title, first),
        ]
        .into_iter()
        .collect();
        assert_eq!(keys.len(), 2);
        assert!(keys.contains(&ContentKey::markdown(&owner, &title, first)));
    }
}
