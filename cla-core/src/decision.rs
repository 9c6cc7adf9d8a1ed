//! The signed/unsigned decision and the fixed text it maps onto.

use crate::services::{Label, RepoStatus, StatusState};
use crate::signature::UserSignature;

pub const STATUS_RUNNING: &str = "Paul Botsco, the CLA verifier is running";
pub const STATUS_UNSIGNED: &str = "One or more contributors need to sign the CLA";
pub const STATUS_SIGNED: &str = "All contributors have signed the CLA";

/// Static definition of one of the two labels this bot manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelSpec {
    pub name: &'static str,
    pub color: &'static str,
    pub description: &'static str,
}

impl LabelSpec {
    pub fn to_label(&self) -> Label {
        Label {
            name: self.name.to_string(),
            color: self.color.to_string(),
            description: Some(self.description.to_string()),
        }
    }
}

pub const LABEL_NOT_SIGNED: LabelSpec = LabelSpec {
    name: ":monocle_face: cla not signed",
    color: "ff3333",
    description: "The CLA needs to be signed",
};

pub const LABEL_SIGNED: LabelSpec = LabelSpec {
    name: ":heart_eyes: cla signed",
    color: "66CC00",
    description: "The CLA is signed",
};

/// Authors lacking a signature, in order of first appearance.
///
/// Never empty: the only constructor is [`Decision::from_unsigned`], which
/// yields [`Decision::AllSigned`] for an empty list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedAuthors(Vec<UserSignature>);

impl UnsignedAuthors {
    pub fn as_slice(&self) -> &[UserSignature] {
        &self.0
    }

    pub fn logins(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|s| s.user.login.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    AllSigned,
    SomeUnsigned(UnsignedAuthors),
}

impl Decision {
    pub fn from_unsigned(unsigned: Vec<UserSignature>) -> Self {
        if unsigned.is_empty() {
            Self::AllSigned
        } else {
            Self::SomeUnsigned(UnsignedAuthors(unsigned))
        }
    }

    pub fn is_all_signed(&self) -> bool {
        matches!(self, Self::AllSigned)
    }

    pub fn unsigned(&self) -> &[UserSignature] {
        match self {
            Self::AllSigned => &[],
            Self::SomeUnsigned(authors) => authors.as_slice(),
        }
    }

    /// The label that must be on the issue.
    pub fn desired_label(&self) -> LabelSpec {
        match self {
            Self::AllSigned => LABEL_SIGNED,
            Self::SomeUnsigned(_) => LABEL_NOT_SIGNED,
        }
    }

    /// The label that must not be on the issue.
    pub fn opposite_label(&self) -> LabelSpec {
        match self {
            Self::AllSigned => LABEL_NOT_SIGNED,
            Self::SomeUnsigned(_) => LABEL_SIGNED,
        }
    }

    pub fn final_status(&self) -> RepoStatus {
        match self {
            Self::AllSigned => RepoStatus::new(StatusState::Success, STATUS_SIGNED),
            Self::SomeUnsigned(_) => RepoStatus::new(StatusState::Failure, STATUS_UNSIGNED),
        }
    }

    /// The notification comment, only for the unsigned case.
    pub fn comment(&self) -> Option<String> {
        match self {
            Self::AllSigned => None,
            Self::SomeUnsigned(authors) => Some(compose_comment(authors.as_slice())),
        }
    }
}

pub fn running_status() -> RepoStatus {
    RepoStatus::new(StatusState::Pending, STATUS_RUNNING)
}

/// Builds the comment asking `unsigned` authors to sign.
///
/// Each login becomes `" @login"` and the mentions are joined with `","`,
/// so two authors read "we need @john, @doe to sign".
pub fn compose_comment(unsigned: &[UserSignature]) -> String {
    let mentions: Vec<String> = unsigned
        .iter()
        .map(|signature| format!(" @{}", signature.user.login))
        .collect();

    format!(
        "Thanks for the contribution. Before we can merge this, we need{} to sign the Contributor License Agreement",
        mentions.join(",")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::User;
    use proptest::prelude::*;

    fn unsigned(login: &str) -> UserSignature {
        UserSignature {
            user: User {
                login: login.to_string(),
                email: None,
                given_name: None,
            },
            cla_version: "1".to_string(),
        }
    }

    #[test]
    fn test_empty_unsigned_list_is_all_signed() {
        let decision = Decision::from_unsigned(vec![]);
        assert_eq!(decision, Decision::AllSigned);
        assert_eq!(decision.desired_label(), LABEL_SIGNED);
        assert_eq!(decision.opposite_label(), LABEL_NOT_SIGNED);
        assert_eq!(decision.final_status().state, StatusState::Success);
        assert_eq!(decision.final_status().description, STATUS_SIGNED);
        assert!(decision.comment().is_none());
    }

    #[test]
    fn test_unsigned_decision_maps_to_failure() {
        let decision = Decision::from_unsigned(vec![unsigned("john")]);
        assert!(!decision.is_all_signed());
        assert_eq!(decision.desired_label(), LABEL_NOT_SIGNED);
        assert_eq!(decision.opposite_label(), LABEL_SIGNED);
        assert_eq!(
            decision.final_status(),
            RepoStatus::new(StatusState::Failure, STATUS_UNSIGNED)
        );
    }

    #[test]
    fn test_compose_comment_two_authors() {
        let message = compose_comment(&[unsigned("john"), unsigned("doe")]);
        insta::assert_snapshot!(
            message,
            @"Thanks for the contribution. Before we can merge this, we need @john, @doe to sign the Contributor License Agreement"
        );
    }

    #[test]
    fn test_compose_comment_single_author() {
        let message = compose_comment(&[unsigned("octocat")]);
        insta::assert_snapshot!(
            message,
            @"Thanks for the contribution. Before we can merge this, we need @octocat to sign the Contributor License Agreement"
        );
    }

    #[test]
    fn test_label_specs_are_fixed() {
        assert_eq!(LABEL_NOT_SIGNED.name, ":monocle_face: cla not signed");
        assert_eq!(LABEL_NOT_SIGNED.color, "ff3333");
        assert_eq!(LABEL_SIGNED.name, ":heart_eyes: cla signed");
        assert_eq!(LABEL_SIGNED.color, "66CC00");
    }

    proptest! {
        #[test]
        fn prop_comment_mentions_every_login_once(
            logins in proptest::collection::btree_set("[a-z][a-z0-9-]{0,12}", 1..6)
        ) {
            let signatures: Vec<UserSignature> = logins.iter().map(|l| unsigned(l)).collect();
            let message = compose_comment(&signatures);

            for login in &logins {
                let mention = format!("@{}", login);
                let hits = message
                    .split(|c| c == ' ' || c == ',')
                    .filter(|word| *word == mention)
                    .count();
                prop_assert_eq!(hits, 1);
            }
            prop_assert_eq!(message.matches('@').count(), logins.len());
        }

        #[test]
        fn prop_decision_is_unsigned_iff_list_nonempty(n in 0usize..5) {
            let list: Vec<UserSignature> = (0..n).map(|i| unsigned(&format!("user{}", i))).collect();
            let decision = Decision::from_unsigned(list);
            prop_assert_eq!(decision.is_all_signed(), n == 0);
            prop_assert_eq!(decision.unsigned().len(), n);
        }
    }
}
