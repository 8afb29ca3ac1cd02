//! Base58check addresses.
//!
//! Layout before encoding: `version (1) || pubkey_hash (32) || checksum (4)`,
//! where the checksum is the first four bytes of double SHA-256 over the
//! version and hash. The version byte selects the network.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::constants::{MAINNET_ADDRESS_VERSION, TESTNET_ADDRESS_VERSION};
use crate::crypto::PublicKey;
use crate::error::AddressError;
use crate::types::Hash256;

const CHECKSUM_LEN: usize = 4;
const PAYLOAD_LEN: usize = 1 + 32 + CHECKSUM_LEN;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub enum Network {
    #[default]
    Mainnet,
    Testnet,
}

impl Network {
    pub fn address_version(&self) -> u8 {
        match self {
            Network::Mainnet => MAINNET_ADDRESS_VERSION,
            Network::Testnet => TESTNET_ADDRESS_VERSION,
        }
    }

    pub fn from_address_version(version: u8) -> Result<Self, AddressError> {
        match version {
            MAINNET_ADDRESS_VERSION => Ok(Network::Mainnet),
            TESTNET_ADDRESS_VERSION => Ok(Network::Testnet),
            other => Err(AddressError::UnknownVersion(other)),
        }
    }
}

/// A payment destination: a pubkey hash tagged with its network.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address {
    pubkey_hash: Hash256,
    network: Network,
}

impl Address {
    pub fn from_pubkey_hash(pubkey_hash: Hash256, network: Network) -> Self {
        Self { pubkey_hash, network }
    }

    pub fn from_public_key(public_key: &PublicKey, network: Network) -> Self {
        Self::from_pubkey_hash(public_key.pubkey_hash(), network)
    }

    pub fn pubkey_hash(&self) -> Hash256 {
        self.pubkey_hash
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn encode(&self) -> String {
        let mut payload = Vec::with_capacity(PAYLOAD_LEN);
        payload.push(self.network.address_version());
        payload.extend_from_slice(self.pubkey_hash.as_bytes());
        let check = checksum(&payload);
        payload.extend_from_slice(&check);
        bs58::encode(payload).into_string()
    }

    pub fn decode(s: &str) -> Result<Self, AddressError> {
        let payload = bs58::decode(s)
            .into_vec()
            .map_err(|e| AddressError::InvalidBase58(e.to_string()))?;
        if payload.len() != PAYLOAD_LEN {
            return Err(AddressError::InvalidLength(payload.len()));
        }

        let (body, check) = payload.split_at(PAYLOAD_LEN - CHECKSUM_LEN);
        if checksum(body).as_slice() != check {
            return Err(AddressError::InvalidChecksum);
        }

        let network = Network::from_address_version(body[0])?;
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&body[1..]);
        Ok(Self::from_pubkey_hash(Hash256(hash), network))
    }
}

fn checksum(data: &[u8]) -> [u8; CHECKSUM_LEN] {
    let digest = Sha256::digest(Sha256::digest(data));
    let mut out = [0u8; CHECKSUM_LEN];
    out.copy_from_slice(&digest[..CHECKSUM_LEN]);
    out
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.encode())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::decode(&s).map_err(serde::de::Error::custom)
    }
}
