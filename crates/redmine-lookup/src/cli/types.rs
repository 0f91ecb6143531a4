//! CLI value enums and their domain conversions.

use clap::ValueEnum;

use crate::model::EntityType;

/// Entity type for CLI arguments
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityTypeArg {
    /// Dotted-quad IPv4 address
    #[value(name = "ipv4")]
    Ipv4,
    /// MD5 hash
    Md5,
    /// SHA1 hash
    Sha1,
    /// SHA256 hash
    Sha256,
    /// Domain name
    Domain,
    /// Email address
    Email,
}

impl From<EntityTypeArg> for EntityType {
    fn from(arg: EntityTypeArg) -> Self {
        match arg {
            EntityTypeArg::Ipv4 => Self::Ipv4,
            EntityTypeArg::Md5 => Self::Md5,
            EntityTypeArg::Sha1 => Self::Sha1,
            EntityTypeArg::Sha256 => Self::Sha256,
            EntityTypeArg::Domain => Self::Domain,
            EntityTypeArg::Email => Self::Email,
        }
    }
}
