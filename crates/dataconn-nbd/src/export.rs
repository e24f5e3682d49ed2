//! Export metadata advertised during negotiation

use crate::protocol::{
    NBD_FLAG_CAN_MULTI_CONN, NBD_FLAG_HAS_FLAGS, NBD_FLAG_READ_ONLY, NBD_FLAG_SEND_FLUSH,
    NBD_FLAG_SEND_FUA, NBD_FLAG_SEND_TRIM, NBD_FLAG_SEND_WRITE_ZEROES,
};

/// A block device exposed over NBD
///
/// Built once per connection and immutable for the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Export {
    pub name: String,
    pub description: String,
    pub size_bytes: u64,
    pub minimum_block_size: u32,
    pub preferred_block_size: u32,
    pub maximum_block_size: u32,
    pub read_only: bool,
    pub supports_multi_conn: bool,
}

impl Export {
    /// Transmission flags sent with `NBD_INFO_EXPORT`
    #[must_use]
    pub fn transmission_flags(&self) -> u16 {
        let mut flags = NBD_FLAG_HAS_FLAGS
            | NBD_FLAG_SEND_FLUSH
            | NBD_FLAG_SEND_FUA
            | NBD_FLAG_SEND_TRIM
            | NBD_FLAG_SEND_WRITE_ZEROES;
        if self.read_only {
            flags |= NBD_FLAG_READ_ONLY;
        }
        if self.supports_multi_conn {
            flags |= NBD_FLAG_CAN_MULTI_CONN;
        }
        flags
    }

    /// Whether a client-supplied name selects this export
    ///
    /// The empty name selects the default export.
    #[must_use]
    pub fn matches(&self, name: &str) -> bool {
        name.is_empty() || name == self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn export(read_only: bool, multi_conn: bool) -> Export {
        Export {
            name: "vol".to_string(),
            description: String::new(),
            size_bytes: 4096,
            minimum_block_size: 512,
            preferred_block_size: 512,
            maximum_block_size: 512,
            read_only,
            supports_multi_conn: multi_conn,
        }
    }

    #[test]
    fn test_flags() {
        let flags = export(false, true).transmission_flags();
        assert_ne!(flags & NBD_FLAG_CAN_MULTI_CONN, 0);
        assert_eq!(flags & NBD_FLAG_READ_ONLY, 0);
        assert_ne!(flags & NBD_FLAG_SEND_TRIM, 0);

        let flags = export(true, false).transmission_flags();
        assert_ne!(flags & NBD_FLAG_READ_ONLY, 0);
        assert_eq!(flags & NBD_FLAG_CAN_MULTI_CONN, 0);
    }

    #[test]
    fn test_name_matching() {
        let e = export(false, false);
        assert!(e.matches("vol"));
        assert!(e.matches(""));
        assert!(!e.matches("other"));
    }
}
