//! Typed representation of parsed deployment declarations.
//!
//! The descriptor source hands over raw [`Value`]s. This module normalizes them
//! into [`Declaration`]s, rejecting anything structurally invalid before the
//! graph is built.
//!
//! Two shapes are understood:
//!
//! ```yaml
//! # network keyed
//! dev:
//!   - contractName: Token
//!   - contractName: Vault
//!     links: [Token]
//! ---
//! # legacy `deployed` list, `contract` instead of `contractName`
//! deployed:
//!   - live:
//!       - contract: Token
//! ```

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::{NODE_SEPARATOR, SolverError, SolverResult};

/// Key naming the contract of an entry.
pub const CONTRACT_NAME_KEY: &str = "contractName";

/// Accepted alias of [`CONTRACT_NAME_KEY`].
pub const CONTRACT_ALIAS_KEY: &str = "contract";

/// Key listing the libraries an entry links against.
pub const LINKS_KEY: &str = "links";

/// Key wrapping the legacy list of network maps.
pub const DEPLOYED_KEY: &str = "deployed";

/// One contract to deploy on one network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractEntry {
    /// Name of the contract, unique within its network.
    pub contract_name: String,
    /// Contracts on the same network this entry links against, in declared order.
    pub links: Vec<String>,
    /// Remaining deployment parameters, passed through untouched to the executor.
    pub parameters: Map<String, Value>,
}

impl ContractEntry {
    /// Create an entry without links or parameters.
    pub fn new(contract_name: impl Into<String>) -> Self {
        Self {
            contract_name: contract_name.into(),
            links: Vec::new(),
            parameters: Map::new(),
        }
    }

    /// Add a link, ignoring names that are already linked.
    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        let link = link.into();
        if !self.links.contains(&link) {
            self.links.push(link);
        }
        self
    }

    /// Set an opaque deployment parameter.
    pub fn with_parameter(mut self, key: impl Into<String>, value: Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }
}

/// A parsed declaration: contract entries grouped by network.
///
/// Networks are kept in lexical order, entries in declared order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Declaration {
    networks: BTreeMap<String, Vec<ContractEntry>>,
}

impl Declaration {
    /// Create an empty declaration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry to a network.
    pub fn with_entry(mut self, network: impl Into<String>, entry: ContractEntry) -> Self {
        self.networks.entry(network.into()).or_default().push(entry);
        self
    }

    /// Iterate over `(network, entries)` pairs.
    pub fn networks(&self) -> impl Iterator<Item = (&str, &[ContractEntry])> {
        self.networks
            .iter()
            .map(|(network, entries)| (network.as_str(), entries.as_slice()))
    }

    /// Iterate over every `(network, entry)` pair.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &ContractEntry)> {
        self.networks()
            .flat_map(|(network, entries)| entries.iter().map(move |entry| (network, entry)))
    }

    /// Number of contract entries across all networks.
    pub fn len(&self) -> usize {
        self.networks.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Normalize one raw declaration. `index` is only used in error messages.
    pub fn from_value(index: usize, raw: &Value) -> SolverResult<Self> {
        let object = raw
            .as_object()
            .ok_or_else(|| SolverError::malformed(index, "declaration must be an object"))?;

        if object.is_empty() {
            return Err(SolverError::malformed(index, "declaration has no network key"));
        }

        let mut declaration = Self::new();

        for (key, value) in object {
            if key == DEPLOYED_KEY && is_legacy_wrapper(value) {
                declaration.merge_deployed(index, value)?;
            } else {
                declaration.merge_network(index, key, value)?;
            }
        }

        Ok(declaration)
    }

    /// Flatten the legacy `deployed: [{ <network>: [...] }, ...]` form.
    fn merge_deployed(&mut self, index: usize, value: &Value) -> SolverResult<()> {
        let groups = value.as_array().ok_or_else(|| {
            SolverError::malformed(index, format!("'{DEPLOYED_KEY}' must be a list"))
        })?;

        for group in groups {
            let group = group
                .as_object()
                .filter(|group| !group.is_empty())
                .ok_or_else(|| {
                    SolverError::malformed(
                        index,
                        format!("'{DEPLOYED_KEY}' items must map a network to its contracts"),
                    )
                })?;

            for (network, entries) in group {
                self.merge_network(index, network, entries)?;
            }
        }

        Ok(())
    }

    fn merge_network(&mut self, index: usize, network: &str, value: &Value) -> SolverResult<()> {
        if network.trim().is_empty() {
            return Err(SolverError::malformed(index, "network name must not be empty"));
        }
        if network.contains(NODE_SEPARATOR) {
            return Err(SolverError::malformed(
                index,
                format!("network name '{network}' must not contain '{NODE_SEPARATOR}'"),
            ));
        }

        let raw_entries = value.as_array().ok_or_else(|| {
            SolverError::malformed(
                index,
                format!("contracts of network '{network}' must be a list"),
            )
        })?;

        let entries = self.networks.entry(network.to_string()).or_default();
        for (position, raw_entry) in raw_entries.iter().enumerate() {
            entries.push(parse_entry(index, network, position, raw_entry)?);
        }

        Ok(())
    }
}

/// `deployed` is the legacy wrapper unless it directly lists contract entries,
/// in which case it is an ordinary network of that name.
fn is_legacy_wrapper(value: &Value) -> bool {
    let Some(items) = value.as_array() else {
        return true;
    };
    !items.iter().any(|item| {
        item.as_object().is_some_and(|item| {
            item.contains_key(CONTRACT_NAME_KEY) || item.contains_key(CONTRACT_ALIAS_KEY)
        })
    })
}

fn parse_entry(
    index: usize,
    network: &str,
    position: usize,
    raw: &Value,
) -> SolverResult<ContractEntry> {
    let location = format!("entry #{position} of network '{network}'");

    let object = raw
        .as_object()
        .ok_or_else(|| SolverError::malformed(index, format!("{location} must be an object")))?;

    let name_key = if object.contains_key(CONTRACT_NAME_KEY) {
        CONTRACT_NAME_KEY
    } else {
        CONTRACT_ALIAS_KEY
    };

    let contract_name = match object.get(name_key) {
        Some(Value::String(name)) if !name.trim().is_empty() => name.clone(),
        Some(Value::String(_)) => {
            return Err(SolverError::malformed(
                index,
                format!("{location} has an empty '{CONTRACT_NAME_KEY}'"),
            ));
        }
        Some(_) => {
            return Err(SolverError::malformed(
                index,
                format!("{location} has a non-string '{CONTRACT_NAME_KEY}'"),
            ));
        }
        None => {
            return Err(SolverError::malformed(
                index,
                format!("{location} is missing '{CONTRACT_NAME_KEY}'"),
            ));
        }
    };

    let mut entry = ContractEntry::new(contract_name);

    match object.get(LINKS_KEY) {
        None | Some(Value::Null) => {}
        Some(Value::Array(links)) => {
            for link in links {
                match link {
                    Value::String(link) if !link.trim().is_empty() => {
                        entry = entry.with_link(link.as_str());
                    }
                    other => {
                        return Err(SolverError::malformed(
                            index,
                            format!(
                                "{location} ('{}') has an invalid link: {other}",
                                entry.contract_name
                            ),
                        ));
                    }
                }
            }
        }
        Some(_) => {
            return Err(SolverError::malformed(
                index,
                format!("{location} has '{LINKS_KEY}' that is not a list"),
            ));
        }
    }

    entry.parameters = object
        .iter()
        .filter(|(key, _)| key.as_str() != name_key && key.as_str() != LINKS_KEY)
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    Ok(entry)
}

/// Normalize every raw declaration, failing on the first malformed one.
pub fn parse_declarations(raw: &[Value]) -> SolverResult<Vec<Declaration>> {
    let declarations = raw
        .iter()
        .enumerate()
        .map(|(index, value)| Declaration::from_value(index, value))
        .collect::<SolverResult<Vec<_>>>()?;

    tracing::debug!(
        declarations = declarations.len(),
        entries = declarations.iter().map(Declaration::len).sum::<usize>(),
        "Parsed deployment declarations"
    );

    Ok(declarations)
}
