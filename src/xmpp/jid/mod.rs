/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

mod error;

use std::fmt::Display;
use std::hash::Hash;
use std::hash::Hasher;
use std::str::FromStr;

pub use error::BadJid;
use error::description;

const MAX_PART_LEN: usize = 1023;

fn check_part(part: &str, empty: &'static str, too_long: &'static str) -> Result<(), BadJid> {
    if part.is_empty() {
        return Err(BadJid(empty));
    }
    if part.len() > MAX_PART_LEN {
        return Err(BadJid(too_long));
    }
    Ok(())
}

/// The address of an entity in the XMPP protocol.
///
/// Each JID has three parts:
/// - Local part: Optionally identifies a local entity on the domain.
/// - Domain part: Identifies an XMPP server.
/// - Resource part: Optionally identifies a connected session of the entity.
///
/// More details can be found in [RFC7622](https://datatracker.ietf.org/doc/rfc7622/)
///
/// ```
/// use ikstream::Jid;
///
/// let jid: Jid = "juliet@example.com/balcony".parse()?;
/// assert_eq!(jid.bare(), "juliet@example.com");
/// assert_eq!(jid.resourcepart(), Some("balcony"));
/// # Ok::<(), ikstream::BadJid>(())
/// ```
#[derive(Debug, Clone, Eq)]
pub struct Jid {
    full: String,
    // Byte positions of the separators, a part longer than the limit
    // is rejected so they always fit.
    at_pos: Option<u16>,
    slash_pos: Option<u16>,
}

impl Jid {
    /// Parses a JID from a string.
    pub fn new(jid: &str) -> Result<Self, BadJid> {
        let (bare, resource) = match jid.split_once('/') {
            Some((bare, resource)) => (bare, Some(resource)),
            None => (jid, None),
        };
        let (local, domain) = match bare.split_once('@') {
            Some((local, domain)) => (Some(local), domain),
            None => (None, bare),
        };
        // Final dot of the domain is removed as per RFC 7622 section 3.2
        let domain = domain.strip_suffix('.').unwrap_or(domain);
        check_part(domain, description::DOMAIN_EMPTY, description::DOMAIN_TOO_LONG)?;
        if let Some(local) = local {
            check_part(local, description::LOCAL_EMPTY, description::LOCAL_TOO_LONG)?;
        }
        if let Some(resource) = resource {
            check_part(
                resource,
                description::RESOURCE_EMPTY,
                description::RESOURCE_TOO_LONG,
            )?;
        }
        Ok(Self::from_parts(local, domain, resource))
    }

    fn from_parts(local: Option<&str>, domain: &str, resource: Option<&str>) -> Jid {
        let size = local.map_or(0, |l| l.len() + 1)
            + domain.len()
            + resource.map_or(0, |r| r.len() + 1);
        let mut full = String::with_capacity(size);
        let mut at_pos = None;
        let mut slash_pos = None;
        if let Some(local) = local {
            full.push_str(local);
            at_pos = Some(full.len() as u16);
            full.push('@');
        }
        full.push_str(domain);
        if let Some(resource) = resource {
            slash_pos = Some(full.len() as u16);
            full.push('/');
            full.push_str(resource);
        }
        Jid {
            full,
            at_pos,
            slash_pos,
        }
    }

    /// Full form of the JID with all the components.
    pub fn full(&self) -> &str {
        &self.full
    }

    /// Bare form of the JID without the resource part.
    pub fn bare(&self) -> &str {
        match self.slash_pos {
            Some(pos) => &self.full[..pos as usize],
            None => &self.full,
        }
    }

    pub fn localpart(&self) -> Option<&str> {
        self.at_pos.map(|pos| &self.full[..pos as usize])
    }

    pub fn domainpart(&self) -> &str {
        let start = self.at_pos.map_or(0, |pos| pos as usize + 1);
        &self.bare()[start..]
    }

    pub fn resourcepart(&self) -> Option<&str> {
        self.slash_pos.map(|pos| &self.full[pos as usize + 1..])
    }

    /// True if the JID does not contain a resource part.
    pub fn is_bare(&self) -> bool {
        self.slash_pos.is_none()
    }

    /// Copy of the JID without the resource part.
    pub fn to_bare(&self) -> Jid {
        Self::from_parts(self.localpart(), self.domainpart(), None)
    }

    /// Creates another JID with the resource part replaced.
    pub fn with_resource(&self, resource: &str) -> Result<Jid, BadJid> {
        check_part(
            resource,
            description::RESOURCE_EMPTY,
            description::RESOURCE_TOO_LONG,
        )?;
        Ok(Self::from_parts(
            self.localpart(),
            self.domainpart(),
            Some(resource),
        ))
    }
}

impl FromStr for Jid {
    type Err = BadJid;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Jid::new(s)
    }
}

impl Display for Jid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.full)
    }
}

impl PartialEq for Jid {
    fn eq(&self, other: &Jid) -> bool {
        self.full == other.full
    }
}

impl PartialOrd for Jid {
    fn partial_cmp(&self, other: &Jid) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Jid {
    fn cmp(&self, other: &Jid) -> std::cmp::Ordering {
        self.full.cmp(&other.full)
    }
}

impl Hash for Jid {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.full.hash(state)
    }
}

#[cfg(test)]
mod tests;
