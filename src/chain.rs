//! Chain alias resolution.
//!
//! Vendors name the same network in many ways ("BSC", "BEP20",
//! "BNB Smart Chain (BEP20)"). The resolver builds a normalized alias set
//! per chain key and matches vendor network strings by substring.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Static description of a chain as configured by the user.
#[derive(Debug, Clone, Default)]
pub struct ChainDef {
    pub key: String,
    pub name: String,
    pub short_code: Option<String>,
    pub synonyms: Vec<String>,
}

/// Lower-case, strip separators and parentheses, fold diacritics.
pub fn normalize(input: &str) -> String {
    input
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .filter(|c| !c.is_whitespace() && !matches!(c, '_' | '-' | '(' | ')'))
        .collect()
}

/// Matches vendor network strings against configured chains.
///
/// Alias sets are built lazily on first use of a chain key and cached.
pub struct ChainAliasResolver {
    chains: HashMap<String, ChainDef>,
    cache: RwLock<HashMap<String, Arc<Vec<String>>>>,
}

impl ChainAliasResolver {
    pub fn new(chains: impl IntoIterator<Item = ChainDef>) -> Self {
        let chains = chains
            .into_iter()
            .map(|c| (c.key.to_lowercase(), c))
            .collect();
        Self {
            chains,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Normalized aliases for `chain_key`. Unknown keys alias only themselves.
    pub fn aliases(&self, chain_key: &str) -> Arc<Vec<String>> {
        let key = chain_key.to_lowercase();
        if let Some(hit) = self.cache.read().get(&key) {
            return Arc::clone(hit);
        }

        let mut aliases = vec![normalize(chain_key)];
        if let Some(def) = self.chains.get(&key) {
            aliases.push(normalize(&def.name));
            if let Some(code) = &def.short_code {
                aliases.push(normalize(code));
            }
            aliases.extend(def.synonyms.iter().map(|s| normalize(s)));
        }
        aliases.retain(|a| !a.is_empty());
        aliases.sort();
        aliases.dedup();

        let aliases = Arc::new(aliases);
        self.cache
            .write()
            .entry(key)
            .or_insert_with(|| Arc::clone(&aliases))
            .clone()
    }

    /// Whether a vendor network string refers to `chain_key`.
    pub fn matches(&self, chain_key: &str, vendor_network: &str) -> bool {
        let network = normalize(vendor_network);
        if network.is_empty() {
            return false;
        }
        self.aliases(chain_key)
            .iter()
            .any(|alias| network.contains(alias.as_str()))
    }

    pub fn chain(&self, chain_key: &str) -> Option<&ChainDef> {
        self.chains.get(&chain_key.to_lowercase())
    }
}
