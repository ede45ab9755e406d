use crc32fast::Hasher;

/// Generate a per-client id seed from the investigation and client ids using CRC32
pub fn get_client_seed(investigation_id: &str, client_id: u64) -> String {
    let mut hasher = Hasher::new();
    hasher.update(investigation_id.as_bytes());
    hasher.update(b"/");
    hasher.update(&client_id.to_le_bytes());
    format!("{:x}", hasher.finalize())
}

/// Sequential id generator for entities created by one client
#[derive(Debug, Clone)]
pub struct IdGenerator {
    seed: String,
    count: u32,
}

impl IdGenerator {
    pub fn new(investigation_id: &str, client_id: u64) -> Self {
        Self {
            seed: get_client_seed(investigation_id, client_id),
            count: 0,
        }
    }

    /// Generate next sequential id with a kind prefix (`el`, `ln`, `tab`, ...)
    pub fn new_id(&mut self, prefix: &str) -> String {
        self.count += 1;
        format!("{}-{}-{}", prefix, self.seed, self.count)
    }

    /// Generate the next id that `taken` does not already claim
    pub fn new_unique_id(&mut self, prefix: &str, taken: impl Fn(&str) -> bool) -> String {
        loop {
            let id = self.new_id(prefix);
            if !taken(&id) {
                return id;
            }
        }
    }

    pub fn seed(&self) -> &str {
        &self.seed
    }
}
