//! Chat network addresses (JIDs).
//!
//! Individuals look like `5493515925801@s.whatsapp.net`, groups like
//! `120363000000000000@g.us`.

pub const INDIVIDUAL_SUFFIX: &str = "@s.whatsapp.net";
pub const GROUP_SUFFIX: &str = "@g.us";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressKind {
    Individual,
    Group,
    Other,
}

#[must_use]
pub fn kind_of(address: &str) -> AddressKind {
    if address.ends_with(INDIVIDUAL_SUFFIX) && address.len() > INDIVIDUAL_SUFFIX.len() {
        AddressKind::Individual
    } else if address.ends_with(GROUP_SUFFIX) && address.len() > GROUP_SUFFIX.len() {
        AddressKind::Group
    } else {
        AddressKind::Other
    }
}

/// The part before `@`, i.e. the phone number for individuals.
#[must_use]
pub fn user_part(address: &str) -> &str {
    address.split_once('@').map_or(address, |(user, _)| user)
}

/// Append the individual suffix to a bare number. Tokens that already carry a
/// domain are returned untouched.
#[must_use]
pub fn individual(token: &str) -> String {
    if token.contains('@') {
        token.to_owned()
    } else {
        format!("{token}{INDIVIDUAL_SUFFIX}")
    }
}
