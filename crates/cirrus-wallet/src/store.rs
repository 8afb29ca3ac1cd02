//! Transaction history stores.
//!
//! [`MemoryTransactionStore`] keeps records in process memory.
//! [`RocksTransactionStore`] (feature `rocksdb`) persists them in RocksDB.

use std::collections::HashMap;

use parking_lot::RwLock;

use cirrus_core::error::StoreError;
use cirrus_core::record::{TransactionRecord, TxStatus};
use cirrus_core::traits::TransactionStore;
use cirrus_core::types::Hash256;

#[cfg(feature = "rocksdb")]
pub use rocks::RocksTransactionStore;

#[derive(Default)]
struct MemoryInner {
    records: HashMap<Hash256, TransactionRecord>,
    /// Insertion order.
    order: Vec<Hash256>,
}

/// In-memory [`TransactionStore`].
#[derive(Default)]
pub struct MemoryTransactionStore {
    inner: RwLock<MemoryInner>,
}

impl MemoryTransactionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TransactionStore for MemoryTransactionStore {
    fn record_transaction(&self, record: &TransactionRecord) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        if inner.records.contains_key(&record.txid) {
            return Err(StoreError::Duplicate(record.txid.to_string()));
        }
        inner.order.push(record.txid);
        inner.records.insert(record.txid, record.clone());
        Ok(())
    }

    fn update_status(&self, txid: &Hash256, status: TxStatus) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        let record = inner
            .records
            .get_mut(txid)
            .ok_or_else(|| StoreError::NotFound(txid.to_string()))?;
        record.status = status;
        Ok(())
    }

    fn record_relay_attempt(&self, txid: &Hash256, error: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        let record = inner
            .records
            .get_mut(txid)
            .ok_or_else(|| StoreError::NotFound(txid.to_string()))?;
        record.relay_attempts = record.relay_attempts.saturating_add(1);
        record.last_relay_error = Some(error.to_string());
        Ok(())
    }

    fn get(&self, txid: &Hash256) -> Result<Option<TransactionRecord>, StoreError> {
        Ok(self.inner.read().records.get(txid).cloned())
    }

    fn all(&self) -> Result<Vec<TransactionRecord>, StoreError> {
        let inner = self.inner.read();
        Ok(inner
            .order
            .iter()
            .filter_map(|txid| inner.records.get(txid).cloned())
            .collect())
    }
}

#[cfg(feature = "rocksdb")]
mod rocks {
    //! RocksDB-backed [`TransactionStore`].
    //!
    //! Records are bincode-encoded in the `records` column family keyed by
    //! txid. The `order` column family maps a big-endian sequence number to
    //! the txid so [`TransactionStore::all`] iterates oldest first. New
    //! records and their sequence entry are written in one [`WriteBatch`].

    use std::path::Path;

    use parking_lot::Mutex;
    use rocksdb::{ColumnFamilyDescriptor, IteratorMode, Options, WriteBatch, DB};

    use super::*;

    const CF_RECORDS: &str = "records";
    const CF_ORDER: &str = "order";
    const CF_METADATA: &str = "metadata";

    const ALL_CFS: &[&str] = &[CF_RECORDS, CF_ORDER, CF_METADATA];

    const META_NEXT_SEQ: &[u8] = b"next_seq";

    pub struct RocksTransactionStore {
        db: DB,
        /// Serializes read-modify-write of records and the sequence counter.
        write_lock: Mutex<()>,
    }

    impl RocksTransactionStore {
        /// Open or create the store at `path`.
        pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
            let mut db_opts = Options::default();
            db_opts.create_if_missing(true);
            db_opts.create_missing_column_families(true);

            let cf_descriptors: Vec<ColumnFamilyDescriptor> = ALL_CFS
                .iter()
                .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
                .collect();

            let db = DB::open_cf_descriptors(&db_opts, path.as_ref(), cf_descriptors)
                .map_err(|e| StoreError::Backend(e.to_string()))?;
            Ok(Self {
                db,
                write_lock: Mutex::new(()),
            })
        }

        fn cf(&self, name: &str) -> Result<&rocksdb::ColumnFamily, StoreError> {
            self.db
                .cf_handle(name)
                .ok_or_else(|| StoreError::Backend(format!("missing column family {name}")))
        }

        fn next_seq(&self) -> Result<u64, StoreError> {
            let cf = self.cf(CF_METADATA)?;
            match self
                .db
                .get_cf(cf, META_NEXT_SEQ)
                .map_err(|e| StoreError::Backend(e.to_string()))?
            {
                Some(bytes) => {
                    let arr: [u8; 8] = bytes
                        .as_slice()
                        .try_into()
                        .map_err(|_| StoreError::Serialization("invalid sequence length".into()))?;
                    Ok(u64::from_le_bytes(arr))
                }
                None => Ok(0),
            }
        }

        fn put_record(&self, record: &TransactionRecord) -> Result<(), StoreError> {
            let cf = self.cf(CF_RECORDS)?;
            self.db
                .put_cf(cf, record.txid.as_bytes(), encode(record)?)
                .map_err(|e| StoreError::Backend(e.to_string()))
        }

        fn modify<F>(&self, txid: &Hash256, f: F) -> Result<(), StoreError>
        where
            F: FnOnce(&mut TransactionRecord),
        {
            let _guard = self.write_lock.lock();
            let mut record = self
                .get(txid)?
                .ok_or_else(|| StoreError::NotFound(txid.to_string()))?;
            f(&mut record);
            self.put_record(&record)
        }
    }

    impl TransactionStore for RocksTransactionStore {
        fn record_transaction(&self, record: &TransactionRecord) -> Result<(), StoreError> {
            let _guard = self.write_lock.lock();
            if self.get(&record.txid)?.is_some() {
                return Err(StoreError::Duplicate(record.txid.to_string()));
            }

            let seq = self.next_seq()?;
            let mut batch = WriteBatch::default();
            batch.put_cf(self.cf(CF_RECORDS)?, record.txid.as_bytes(), encode(record)?);
            batch.put_cf(self.cf(CF_ORDER)?, seq.to_be_bytes(), record.txid.as_bytes());
            batch.put_cf(self.cf(CF_METADATA)?, META_NEXT_SEQ, (seq + 1).to_le_bytes());
            self.db
                .write(batch)
                .map_err(|e| StoreError::Backend(e.to_string()))
        }

        fn update_status(&self, txid: &Hash256, status: TxStatus) -> Result<(), StoreError> {
            self.modify(txid, |r| r.status = status)
        }

        fn record_relay_attempt(&self, txid: &Hash256, error: &str) -> Result<(), StoreError> {
            self.modify(txid, |r| {
                r.relay_attempts = r.relay_attempts.saturating_add(1);
                r.last_relay_error = Some(error.to_string());
            })
        }

        fn get(&self, txid: &Hash256) -> Result<Option<TransactionRecord>, StoreError> {
            let cf = self.cf(CF_RECORDS)?;
            match self
                .db
                .get_cf(cf, txid.as_bytes())
                .map_err(|e| StoreError::Backend(e.to_string()))?
            {
                Some(bytes) => decode(&bytes).map(Some),
                None => Ok(None),
            }
        }

        fn all(&self) -> Result<Vec<TransactionRecord>, StoreError> {
            let cf = self.cf(CF_ORDER)?;
            let mut records = Vec::new();
            for item in self.db.iterator_cf(cf, IteratorMode::Start) {
                let (_, value) = item.map_err(|e| StoreError::Backend(e.to_string()))?;
                let bytes: [u8; 32] = value
                    .as_ref()
                    .try_into()
                    .map_err(|_| StoreError::Serialization("invalid txid length".into()))?;
                if let Some(record) = self.get(&Hash256(bytes))? {
                    records.push(record);
                }
            }
            Ok(records)
        }
    }

    fn encode(record: &TransactionRecord) -> Result<Vec<u8>, StoreError> {
        bincode::encode_to_vec(record, bincode::config::standard())
            .map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn decode(bytes: &[u8]) -> Result<TransactionRecord, StoreError> {
        let (record, _) = bincode::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(record)
    }

}
