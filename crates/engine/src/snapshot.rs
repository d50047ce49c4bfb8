use crate::character::Character;
use crate::office::Office;
use crate::store::Store;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const SNAPSHOT_KEY: &str = "office.snapshot";
const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub saved_at: String,
    pub completed_today: u64,
    pub characters: Vec<Character>,
    /// sha256 over the JSON of `completed_today` and `characters`.
    pub hash: String,
}

#[derive(Serialize)]
struct Body<'a> {
    completed_today: u64,
    characters: &'a [Character],
}

fn content_hash(completed_today: u64, characters: &[Character]) -> anyhow::Result<String> {
    let body = serde_json::to_vec(&Body {
        completed_today,
        characters,
    })?;
    Ok(format!("{:x}", Sha256::digest(&body)))
}

impl Snapshot {
    pub fn capture(office: &Office) -> anyhow::Result<Self> {
        Ok(Self {
            version: SNAPSHOT_VERSION,
            saved_at: crate::rfc3339_now(),
            completed_today: office.completed_today,
            characters: office.characters.clone(),
            hash: content_hash(office.completed_today, &office.characters)?,
        })
    }

    pub fn verify(&self) -> anyhow::Result<()> {
        if self.version != SNAPSHOT_VERSION {
            anyhow::bail!("unsupported snapshot version {}", self.version);
        }
        let expected = content_hash(self.completed_today, &self.characters)?;
        if expected != self.hash {
            anyhow::bail!("snapshot hash mismatch");
        }
        Ok(())
    }

    /// Copies saved character state onto the office by id. Characters the
    /// office no longer has are skipped, as are zones it no longer has.
    /// Returns how many characters were restored.
    pub fn restore(&self, office: &mut Office) -> anyhow::Result<usize> {
        self.verify()?;
        let cap = office.history_cap;
        let mut restored = 0;
        for saved in &self.characters {
            let zone_ok = office.zones.contains(&saved.zone);
            let Some(c) = office.character_mut(&saved.id) else {
                continue;
            };
            c.task = saved.task.clone();
            c.progress = saved.progress.min(100);
            c.status = saved.status;
            let skip = saved.history.len().saturating_sub(cap);
            c.history = saved.history[skip..].to_vec();
            if zone_ok {
                c.zone = saved.zone.clone();
                c.position = saved.position;
            }
            restored += 1;
        }
        office.completed_today = self.completed_today;
        Ok(restored)
    }
}

pub fn export(office: &Office, store: &Store) -> anyhow::Result<Snapshot> {
    let snap = Snapshot::capture(office)?;
    let json = serde_json::to_string(&snap)?;
    store.put_blob(SNAPSHOT_KEY, &json).context("save snapshot")?;
    Ok(snap)
}

/// Restores the last exported snapshot. `Ok(None)` when nothing was saved.
pub fn import(office: &mut Office, store: &Store) -> anyhow::Result<Option<Snapshot>> {
    let Some(blob) = store.get_blob(SNAPSHOT_KEY).context("load snapshot")? else {
        return Ok(None);
    };
    let snap: Snapshot = serde_json::from_str(&blob.value_json).context("decode snapshot")?;
    snap.restore(office)?;
    Ok(Some(snap))
}
