//! In-memory model of on-card content
//!
//! GET STATUS results are collected into an [`AidRegistry`]: an ordered list
//! of the issuer security domain, supplementary security domains,
//! applications and executable load files present on the card.

use crate::aid::Aid;

/// What kind of on-card entity a registry entry describes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// The issuer security domain
    IssuerSecurityDomain,
    /// A supplementary security domain
    SecurityDomain,
    /// An application instance
    Application,
    /// An executable load file (package)
    ExecutableLoadFiles,
    /// An executable load file reported together with its modules
    ExecutableLoadFilesAndModules,
}

/// One on-card entity: AID, lifecycle, privileges and kind
#[derive(Debug, Clone)]
pub struct RegistryEntry {
    aid: Aid,
    life_cycle: u8,
    privileges: u8,
    kind: Kind,
    modules: Vec<Aid>,
}

impl RegistryEntry {
    /// Create a new entry without modules
    pub fn new(aid: Aid, life_cycle: u8, privileges: u8, kind: Kind) -> Self {
        Self {
            aid,
            life_cycle,
            privileges,
            kind,
            modules: Vec::new(),
        }
    }

    /// The entry's AID
    pub fn aid(&self) -> &Aid {
        &self.aid
    }

    /// The lifecycle state byte
    pub const fn life_cycle(&self) -> u8 {
        self.life_cycle
    }

    /// The privileges byte
    pub const fn privileges(&self) -> u8 {
        self.privileges
    }

    /// The entry kind
    pub const fn kind(&self) -> Kind {
        self.kind
    }

    /// Module AIDs of an executable load file, in card order
    pub fn modules(&self) -> &[Aid] {
        &self.modules
    }

    pub(crate) fn add_module(&mut self, aid: Aid) {
        self.modules.push(aid);
    }
}

/// Ordered collection of registry entries
#[derive(Debug, Clone, Default)]
pub struct AidRegistry {
    entries: Vec<RegistryEntry>,
}

impl AidRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry
    pub fn add(&mut self, entry: RegistryEntry) {
        self.entries.push(entry);
    }

    /// Append many entries, preserving order
    pub fn extend(&mut self, entries: impl IntoIterator<Item = RegistryEntry>) {
        self.entries.extend(entries);
    }

    /// All entries in card order
    pub fn entries(&self) -> &[RegistryEntry] {
        &self.entries
    }

    /// Applications and security domains
    pub fn applications(&self) -> impl Iterator<Item = &RegistryEntry> {
        self.entries.iter().filter(|e| {
            matches!(
                e.kind(),
                Kind::Application | Kind::SecurityDomain | Kind::IssuerSecurityDomain
            )
        })
    }

    /// Executable load files
    pub fn load_files(&self) -> impl Iterator<Item = &RegistryEntry> {
        self.entries.iter().filter(|e| {
            matches!(
                e.kind(),
                Kind::ExecutableLoadFiles | Kind::ExecutableLoadFilesAndModules
            )
        })
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl IntoIterator for AidRegistry {
    type Item = RegistryEntry;
    type IntoIter = std::vec::IntoIter<RegistryEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_registry_filters() {
        let mut registry = AidRegistry::new();
        registry.add(RegistryEntry::new(
            Aid::new(hex!("A000000151000000").to_vec()).unwrap(),
            0x01,
            0x9E,
            Kind::IssuerSecurityDomain,
        ));
        registry.add(RegistryEntry::new(
            Aid::new(hex!("A00000000300000001").to_vec()).unwrap(),
            0x07,
            0x00,
            Kind::Application,
        ));
        registry.add(RegistryEntry::new(
            Aid::new(hex!("A0000000620301").to_vec()).unwrap(),
            0x01,
            0x00,
            Kind::ExecutableLoadFiles,
        ));

        assert_eq!(registry.len(), 3);
        assert_eq!(registry.applications().count(), 2);
        assert_eq!(registry.load_files().count(), 1);
        assert!(!registry.is_empty());
    }
}
