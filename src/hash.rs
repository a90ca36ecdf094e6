use std::io::{Read, Write};

use crate::constants::INTERN_BUCKETS;
use crate::result::{Error, Result};
use crate::stream::{DataReader, DataWriter};

/// Per-frame string dictionary. Distinct texts get dense ids in first-seen
/// order; the chains keep a refcount per text and the dense vector maps ids
/// back for decoding.
pub(crate) struct HashTable {
    heads: Vec<i32>,
    recs: Vec<HashRec>,
    strings: Vec<String>,
    next_id: i32,
    cloned: bool,
}

#[derive(Clone)]
struct HashRec {
    name: String,
    cnt: i32,
    id: i32,
    next: i32,
}

impl HashTable {
    pub fn new() -> Self {
        Self {
            heads: vec![-1; INTERN_BUCKETS],
            recs: Vec::new(),
            strings: Vec::new(),
            next_id: 0,
            cloned: false,
        }
    }

    pub fn len(&self) -> i32 {
        self.next_id
    }

    /// Dense id → text vector, the decode side channel.
    pub fn strings(&self) -> &[String] {
        &self.strings
    }

    pub fn get(&self, id: i64) -> Result<&str> {
        if id < 0 || id >= i64::from(self.next_id) {
            return Err(Error::InternIdOutOfRange {
                id,
                size: self.next_id,
            });
        }
        Ok(&self.strings[id as usize])
    }

    /// Interns `name`, bumping its refcount when already present. A table
    /// obtained through `clone` empties itself on the first store so the
    /// origin's state never leaks into a new frame.
    pub fn store(&mut self, name: &str) {
        if self.cloned {
            self.reset();
        }
        let bucket = hash(name);
        let mut at = self.heads[bucket];
        while at >= 0 {
            let rec = &mut self.recs[at as usize];
            if rec.name == name {
                rec.cnt += 1;
                return;
            }
            at = rec.next;
        }
        let id = self.next_id;
        self.next_id += 1;
        self.recs.push(HashRec {
            name: name.to_owned(),
            cnt: 1,
            id,
            next: self.heads[bucket],
        });
        self.heads[bucket] = (self.recs.len() - 1) as i32;
        self.strings.push(name.to_owned());
    }

    pub fn find_id(&self, name: &str) -> Option<i32> {
        let mut at = self.heads[hash(name)];
        while at >= 0 {
            let rec = &self.recs[at as usize];
            if rec.name == name {
                return Some(rec.id);
            }
            at = rec.next;
        }
        None
    }

    #[cfg(test)]
    fn refcount(&self, name: &str) -> Option<i32> {
        let mut at = self.heads[hash(name)];
        while at >= 0 {
            let rec = &self.recs[at as usize];
            if rec.name == name {
                return Some(rec.cnt);
            }
            at = rec.next;
        }
        None
    }

    fn reset(&mut self) {
        for head in &mut self.heads {
            *head = -1;
        }
        self.recs.clear();
        self.strings.clear();
        self.next_id = 0;
        self.cloned = false;
    }

    /// Serialises `next_id` then every record as `(text, refcount, id)`,
    /// walking buckets in order.
    pub fn save<W: Write>(&self, out: &mut DataWriter<W>) -> Result<()> {
        out.write_i32(self.next_id)?;
        for head in &self.heads {
            let mut at = *head;
            while at >= 0 {
                let rec = &self.recs[at as usize];
                out.write_string(&rec.name)?;
                out.write_i32(rec.cnt)?;
                out.write_i32(rec.id)?;
                at = rec.next;
            }
        }
        Ok(())
    }

    pub fn load<R: Read>(src: &mut DataReader<R>) -> Result<Self> {
        let mut table = HashTable::new();
        let count = src.read_i32()?;
        if count < 0 {
            return Err(Error::FormatViolation("negative dictionary size"));
        }
        table.next_id = count;
        table.strings = vec![String::new(); count as usize];
        for _ in 0..count {
            let name = src.read_string()?;
            let cnt = src.read_i32()?;
            let id = src.read_i32()?;
            if id < 0 || id >= count {
                return Err(Error::InternIdOutOfRange {
                    id: id.into(),
                    size: count,
                });
            }
            let bucket = hash(&name);
            table.strings[id as usize] = name.clone();
            table.recs.push(HashRec {
                name,
                cnt,
                id,
                next: table.heads[bucket],
            });
            table.heads[bucket] = (table.recs.len() - 1) as i32;
        }
        Ok(table)
    }
}

impl Clone for HashTable {
    fn clone(&self) -> Self {
        Self {
            heads: self.heads.clone(),
            recs: self.recs.clone(),
            strings: self.strings.clone(),
            next_id: self.next_id,
            cloned: true,
        }
    }
}

impl std::fmt::Debug for HashTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HashTable")
            .field("entries", &self.next_id)
            .field("cloned", &self.cloned)
            .finish()
    }
}

fn low32(x: i64) -> i64 {
    (x as u64 & 0xffff_ffff) as i64
}

// The legacy recurrence, kept bit-for-bit so texts land in the same buckets
// as existing ODA files.
fn hash(name: &str) -> usize {
    let size = INTERN_BUCKETS as i64;
    let mut n: i64 = 0;
    for b in name.bytes() {
        n = low32(n + low32((i64::from(b) - i64::from(b'A')) + low32(n << 5)));
    }
    if n < 0 {
        let m = -n / size;
        n = low32(n + low32(low32(m + 1) * size));
    }
    (n % size) as usize
}

#[cfg(test)]
mod tests {
    use declio::ctx::Endian;

    use super::*;

    #[test]
    fn ids_are_dense_and_stable() {
        let mut t = HashTable::new();
        for name in ["alpha", "beta", "alpha", "gamma", "beta", "alpha"] {
            t.store(name);
        }
        assert_eq!(t.len(), 3);
        assert_eq!(t.find_id("alpha"), Some(0));
        assert_eq!(t.find_id("beta"), Some(1));
        assert_eq!(t.find_id("gamma"), Some(2));
        assert_eq!(t.find_id("delta"), None);
        assert_eq!(t.refcount("alpha"), Some(3));
        assert_eq!(t.strings(), ["alpha", "beta", "gamma"]);
    }

    #[test]
    fn save_load_round_trips() {
        let mut t = HashTable::new();
        for name in ["station", "pressure", "station", ""] {
            t.store(name);
        }
        let mut buf = Vec::new();
        let mut out = DataWriter::new(&mut buf, Endian::Little);
        t.save(&mut out).unwrap();

        let mut src = DataReader::new(&buf[..], Endian::Little);
        let loaded = HashTable::load(&mut src).unwrap();
        assert_eq!(loaded.len(), t.len());
        assert_eq!(loaded.strings(), t.strings());
        assert_eq!(loaded.find_id("pressure"), Some(1));
        assert_eq!(loaded.refcount("station"), Some(2));
    }

    #[test]
    fn clones_reset_on_first_store() {
        let mut t = HashTable::new();
        t.store("alpha");
        t.store("beta");

        let mut c = t.clone();
        assert_eq!(c.find_id("alpha"), Some(0));
        assert_eq!(c.len(), t.len());

        c.store("gamma");
        assert_eq!(c.len(), 1);
        assert_eq!(c.find_id("gamma"), Some(0));
        assert_eq!(c.find_id("alpha"), None);

        assert_eq!(t.find_id("alpha"), Some(0));
        assert_eq!(t.len(), 2);
    }

    #[test]
    fn out_of_range_ids_are_rejected() {
        let mut t = HashTable::new();
        t.store("only");
        assert_eq!(t.get(0).unwrap(), "only");
        assert!(matches!(
            t.get(1),
            Err(Error::InternIdOutOfRange { id: 1, size: 1 })
        ));
        assert!(matches!(t.get(-1), Err(Error::InternIdOutOfRange { .. })));
    }
}
