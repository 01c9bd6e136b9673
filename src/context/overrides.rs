/// Routing overrides for one execution context. `None` means "use the default alias".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub read: Option<String>,
    pub write: Option<String>,
}

impl Overrides {
    pub fn new(alias: &str, read: bool, write: bool) -> Self {
        let mut overrides = Self::default();
        overrides.publish(alias, read, write);
        overrides
    }

    /// Last writer wins; a disabled direction keeps whatever it had.
    pub fn publish(&mut self, alias: &str, read: bool, write: bool) {
        if read {
            self.read = Some(alias.to_string());
        }
        if write {
            self.write = Some(alias.to_string());
        }
    }

    pub fn clear(&mut self) {
        self.read = None;
        self.write = None;
    }

    pub fn is_empty(&self) -> bool {
        self.read.is_none() && self.write.is_none()
    }

    pub fn read_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.read.as_deref().unwrap_or(default)
    }

    pub fn write_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.write.as_deref().unwrap_or(default)
    }
}
