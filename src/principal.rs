/* Copyright (C) 2025 Pedro Henrique / phkaiser13
* File: src/principal.rs
*
* Resolves owner and group identifiers to numeric ids for `chown`. Numeric
* identifiers are used as-is; names go through the system user and group
* databases (NSS), so accounts served by LDAP, SSSD or systemd resolve the
* same way they do for `chown(1)`. Anything that cannot be resolved maps to
* "leave unchanged" rather than to an error.
*
* SPDX-License-Identifier: Apache-2.0 */

use nix::unistd::{Group, User};

/// Resolves an owner name or numeric uid.
pub fn uid(owner: &str) -> Option<u32> {
    resolve(owner, "user", |name| {
        User::from_name(name).map(|user| user.map(|u| u.uid.as_raw()))
    })
}

/// Resolves a group name or numeric gid.
pub fn gid(group: &str) -> Option<u32> {
    resolve(group, "group", |name| {
        Group::from_name(name).map(|group| group.map(|g| g.gid.as_raw()))
    })
}

fn resolve(
    principal: &str,
    database: &'static str,
    lookup: impl FnOnce(&str) -> nix::Result<Option<u32>>,
) -> Option<u32> {
    let principal = principal.trim();
    if principal.is_empty() {
        return None;
    }
    if principal.bytes().all(|b| b.is_ascii_digit()) {
        return principal.parse().ok();
    }

    match lookup(principal) {
        Ok(Some(id)) => Some(id),
        Ok(None) => {
            tracing::warn!(principal, database, "Unknown principal; ownership left unchanged");
            None
        }
        Err(e) => {
            tracing::warn!(principal, database, error = %e, "Principal lookup failed; ownership left unchanged");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_ids_pass_through() {
        assert_eq!(uid("1001"), Some(1001));
        assert_eq!(gid("0"), Some(0));
        assert_eq!(uid(" 65534 "), Some(65534));
    }

    #[test]
    fn test_names_resolve_through_the_system_databases() {
        assert_eq!(uid("root"), Some(0));
        assert_eq!(gid("root"), Some(0));
    }

    #[test]
    fn test_unknown_or_empty_principals_are_left_unchanged() {
        assert_eq!(uid("cert-deployer-no-such-user"), None);
        assert_eq!(gid("cert-deployer-no-such-group"), None);
        assert_eq!(gid(""), None);
        assert_eq!(uid("   "), None);
    }

    #[test]
    fn test_out_of_range_numeric_id_is_left_unchanged() {
        assert_eq!(uid("99999999999"), None);
    }
}
