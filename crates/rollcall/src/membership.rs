// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Membership sets and snapshots.
//!
//! A [`MembershipSet`] is the coordinator's private view of who answered a
//! poll. A [`Snapshot`] is the immutable, ordered copy of that view handed to
//! the publisher and delivered to subscribers.
//!
//! Wire format of a snapshot:
//! ```text
//! identity-1|identity-2|...|identity-n
//! ```
//! No escaping is applied. An empty snapshot is the empty payload.

use std::collections::HashSet;

/// Delimiter between identities in an encoded snapshot.
pub const IDENTITY_DELIMITER: &str = "|";

/// Unordered collection of unique participant identities.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MembershipSet {
    members: HashSet<String>,
}

impl MembershipSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an identity.
    ///
    /// Returns `false` if the identity was already present.
    pub fn add(&mut self, identity: impl Into<String>) -> bool {
        self.members.insert(identity.into())
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.members.contains(identity)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Identities present in `self` but absent from `other`.
    pub fn difference(&self, other: &MembershipSet) -> MembershipSet {
        Self {
            members: self.members.difference(&other.members).cloned().collect(),
        }
    }

    /// Every identity exactly once, in sorted order.
    pub fn to_ordered_sequence(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.members.iter().cloned().collect();
        ids.sort_unstable();
        ids
    }

    /// Freeze the current membership into a snapshot.
    pub fn to_snapshot(&self) -> Snapshot {
        Snapshot::new(self.to_ordered_sequence())
    }
}

impl<S: Into<String>> FromIterator<S> for MembershipSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            members: iter.into_iter().map(Into::into).collect(),
        }
    }
}

/// Ordered membership at the moment a change was published.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    identities: Vec<String>,
}

impl Snapshot {
    pub fn new(identities: Vec<String>) -> Self {
        Self { identities }
    }

    pub fn identities(&self) -> &[String] {
        &self.identities
    }

    pub fn into_identities(self) -> Vec<String> {
        self.identities
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.identities.iter().any(|id| id == identity)
    }

    /// Order-insensitive view of the snapshot.
    pub fn to_set(&self) -> MembershipSet {
        self.identities.iter().cloned().collect()
    }

    /// Join identities with [`IDENTITY_DELIMITER`].
    pub fn encode(&self) -> Vec<u8> {
        self.identities.join(IDENTITY_DELIMITER).into_bytes()
    }

    /// Split a payload on [`IDENTITY_DELIMITER`].
    ///
    /// The empty payload decodes to the empty snapshot, mirroring [`encode`].
    /// Invalid UTF-8 is replaced rather than rejected.
    ///
    /// [`encode`]: Snapshot::encode
    pub fn decode(payload: &[u8]) -> Self {
        if payload.is_empty() {
            return Self::default();
        }
        let text = String::from_utf8_lossy(payload);
        Self {
            identities: text
                .split(IDENTITY_DELIMITER)
                .map(str::to_owned)
                .collect(),
        }
    }
}

impl std::fmt::Display for Snapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.identities.join(", "))
    }
}
