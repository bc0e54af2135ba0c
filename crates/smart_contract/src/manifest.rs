//! Contract manifests: ABI, groups, permissions.

use serde::{Deserialize, Serialize};

/// Maximum serialized manifest size.
pub const MAX_MANIFEST_SIZE: usize = 65535;

/// A group a contract belongs to: a public key plus a signature over the
/// contract hash proving membership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractGroup {
    /// Compressed secp256r1 public key, hex-encoded.
    pub pubkey: String,
    /// Base64 signature over the contract hash.
    pub signature: String,
}

/// One ABI method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractMethod {
    pub name: String,
    /// Parameter type names, in order.
    #[serde(default)]
    pub parameters: Vec<String>,
    #[serde(rename = "returntype", default)]
    pub return_type: String,
    /// Entry offset into the NEF script.
    pub offset: u32,
    /// Safe methods read state only and may be called without witnesses.
    #[serde(default)]
    pub safe: bool,
}

/// The contract's declared interface.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractAbi {
    #[serde(default)]
    pub methods: Vec<ContractMethod>,
    #[serde(default)]
    pub events: Vec<String>,
}

/// What a contract may call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractPermission {
    /// `"*"`, a contract hash, or a group key.
    pub contract: String,
    /// `["*"]` or explicit method names.
    pub methods: Vec<String>,
}

impl ContractPermission {
    pub fn wildcard() -> Self {
        Self {
            contract: "*".into(),
            methods: vec!["*".into()],
        }
    }
}

/// The declared ABI, permissions and trust list of a contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractManifest {
    pub name: String,
    #[serde(default)]
    pub groups: Vec<ContractGroup>,
    #[serde(default)]
    pub supported_standards: Vec<String>,
    #[serde(default)]
    pub abi: ContractAbi,
    #[serde(default)]
    pub permissions: Vec<ContractPermission>,
    /// `"*"` or explicit contract hashes this contract trusts.
    #[serde(default)]
    pub trusts: Vec<String>,
}

impl ContractManifest {
    /// A permissive manifest for tests and system scripts.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            groups: Vec::new(),
            supported_standards: Vec::new(),
            abi: ContractAbi::default(),
            permissions: vec![ContractPermission::wildcard()],
            trusts: Vec::new(),
        }
    }

    /// Finds a method by name and parameter count (-1 matches any arity).
    pub fn method(&self, name: &str, parameter_count: isize) -> Option<&ContractMethod> {
        self.abi.methods.iter().find(|m| {
            m.name == name
                && (parameter_count < 0 || m.parameters.len() == parameter_count as usize)
        })
    }

    /// Whether this manifest allows calling `method` on a contract.
    pub fn can_call(&self, target_hash: &str, method: &str) -> bool {
        self.permissions.iter().any(|permission| {
            let contract_ok = permission.contract == "*" || permission.contract == target_hash;
            let method_ok =
                permission.methods.iter().any(|m| m == "*" || m == method);
            contract_ok && method_ok
        })
    }

    pub fn to_json_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("manifest serializes")
    }

    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_round_trip() {
        let mut manifest = ContractManifest::new("token");
        manifest.abi.methods.push(ContractMethod {
            name: "transfer".into(),
            parameters: vec!["Hash160".into(), "Hash160".into(), "Integer".into()],
            return_type: "Boolean".into(),
            offset: 0,
            safe: false,
        });
        let bytes = manifest.to_json_bytes();
        assert_eq!(ContractManifest::from_json_bytes(&bytes).unwrap(), manifest);
    }

    #[test]
    fn method_lookup_respects_arity() {
        let mut manifest = ContractManifest::new("m");
        manifest.abi.methods.push(ContractMethod {
            name: "f".into(),
            parameters: vec!["Integer".into()],
            return_type: "Integer".into(),
            offset: 4,
            safe: true,
        });
        assert!(manifest.method("f", 1).is_some());
        assert!(manifest.method("f", -1).is_some());
        assert!(manifest.method("f", 2).is_none());
    }

    #[test]
    fn wildcard_permission_allows_everything() {
        let manifest = ContractManifest::new("m");
        assert!(manifest.can_call("0xabc", "anything"));
    }
}
