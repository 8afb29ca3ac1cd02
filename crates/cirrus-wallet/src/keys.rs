//! Seed management and deterministic key derivation.
//!
//! Child Ed25519 keys are derived from a 32-byte master seed with BLAKE3's
//! key derivation mode, so every key the wallet ever handed out can be
//! recovered from the seed and the next derivation index.

use std::collections::HashMap;
use std::fmt;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop};

use cirrus_core::address::{Address, Network};
use cirrus_core::crypto::KeyPair;
use cirrus_core::traits::KeyStore;
use cirrus_core::types::Hash256;

/// BLAKE3 KDF context for child key derivation.
const KDF_CONTEXT: &str = "cirrus-wallet child key v1";

/// A 32-byte master seed. Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Seed {
    bytes: [u8; 32],
}

impl Seed {
    /// Random seed from the OS RNG.
    pub fn generate() -> Self {
        use rand::RngCore;
        let mut bytes = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self { bytes }
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self { bytes }
    }

    /// Raw seed bytes. Handle with care.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }
}

impl fmt::Debug for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Seed").field("bytes", &"[REDACTED]").finish()
    }
}

/// Deterministic key chain over a master seed.
pub struct KeyChain {
    seed: Seed,
    network: Network,
    next_index: u32,
    keypairs: HashMap<u32, KeyPair>,
    /// pubkey hash -> derivation index
    index_by_hash: HashMap<Hash256, u32>,
}

impl KeyChain {
    pub fn new(seed: Seed, network: Network) -> Self {
        Self {
            seed,
            network,
            next_index: 0,
            keypairs: HashMap::new(),
            index_by_hash: HashMap::new(),
        }
    }

    /// Derive (or fetch the cached) key pair at `index`.
    pub fn derive_keypair(&mut self, index: u32) -> &KeyPair {
        let seed = &self.seed;
        let index_by_hash = &mut self.index_by_hash;
        self.keypairs.entry(index).or_insert_with(|| {
            let kp = derive_child_keypair(seed, index);
            index_by_hash.insert(kp.pubkey_hash(), index);
            kp
        })
    }

    /// Derive the key pair at the next unused index and advance.
    pub fn next_keypair(&mut self) -> &KeyPair {
        let index = self.next_index;
        self.next_index = self.next_index.saturating_add(1);
        self.derive_keypair(index)
    }

    /// Derive the next receive address and advance.
    pub fn next_address(&mut self) -> Address {
        let network = self.network;
        let kp = self.next_keypair();
        Address::from_public_key(&kp.public_key(), network)
    }

    pub fn address_at(&mut self, index: u32) -> Address {
        let network = self.network;
        let kp = self.derive_keypair(index);
        Address::from_public_key(&kp.public_key(), network)
    }

    /// Key pair owning `hash`, among keys derived so far.
    pub fn keypair_for_pubkey_hash(&self, hash: &Hash256) -> Option<&KeyPair> {
        self.index_by_hash
            .get(hash)
            .and_then(|idx| self.keypairs.get(idx))
    }

    /// Re-derive every key below `n` and continue from `n`.
    pub fn restore_to_index(&mut self, n: u32) {
        for i in 0..n {
            self.derive_keypair(i);
        }
        self.next_index = n;
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn next_index(&self) -> u32 {
        self.next_index
    }

    pub fn known_pubkey_hashes(&self) -> impl Iterator<Item = &Hash256> {
        self.index_by_hash.keys()
    }
}

impl fmt::Debug for KeyChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyChain")
            .field("network", &self.network)
            .field("next_index", &self.next_index)
            .field("cached_keys", &self.keypairs.len())
            .finish()
    }
}

/// Serializable key chain state: seed, network, next index.
#[derive(Serialize, Deserialize, Clone, Zeroize, ZeroizeOnDrop)]
pub struct KeyChainData {
    pub seed: [u8; 32],
    #[zeroize(skip)]
    pub network: Network,
    pub next_index: u32,
}

impl KeyChainData {
    pub fn from_keychain(keychain: &KeyChain) -> Self {
        Self {
            seed: *keychain.seed.as_bytes(),
            network: keychain.network,
            next_index: keychain.next_index,
        }
    }

    pub fn to_keychain(&self) -> KeyChain {
        let mut keychain = KeyChain::new(Seed::from_bytes(self.seed), self.network);
        keychain.restore_to_index(self.next_index);
        keychain
    }
}

fn derive_child_keypair(seed: &Seed, index: u32) -> KeyPair {
    let mut ikm = [0u8; 36];
    ikm[..32].copy_from_slice(seed.as_bytes());
    ikm[32..].copy_from_slice(&index.to_le_bytes());
    let derived = blake3::derive_key(KDF_CONTEXT, &ikm);
    ikm.zeroize();
    KeyPair::from_secret_bytes(derived)
}

/// Thread-safe [`KeyStore`] over a [`KeyChain`].
///
/// Each change destination is a freshly derived key.
pub struct SharedKeyChain {
    inner: RwLock<KeyChain>,
}

impl SharedKeyChain {
    pub fn new(keychain: KeyChain) -> Self {
        Self {
            inner: RwLock::new(keychain),
        }
    }

    pub fn from_seed(seed: Seed, network: Network) -> Self {
        Self::new(KeyChain::new(seed, network))
    }

    pub fn next_address(&self) -> Address {
        self.inner.write().next_address()
    }

    pub fn network(&self) -> Network {
        self.inner.read().network()
    }

    pub fn data(&self) -> KeyChainData {
        KeyChainData::from_keychain(&self.inner.read())
    }
}

impl KeyStore for SharedKeyChain {
    fn lookup_key(&self, pubkey_hash: &Hash256) -> Option<KeyPair> {
        self.inner.read().keypair_for_pubkey_hash(pubkey_hash).cloned()
    }

    fn owns(&self, pubkey_hash: &Hash256) -> bool {
        self.inner.read().index_by_hash.contains_key(pubkey_hash)
    }

    fn change_destination(&self) -> Hash256 {
        let mut keychain = self.inner.write();
        let hash = keychain.next_keypair().pubkey_hash();
        debug!(index = keychain.next_index() - 1, "derived change key");
        hash
    }
}

impl fmt::Debug for SharedKeyChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SharedKeyChain").field(&*self.inner.read()).finish()
    }
}
