use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of a running service process, logged at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub name: String,
    pub version: String,
    pub instance_id: Uuid,
}

impl ServiceInfo {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            version: env!("CARGO_PKG_VERSION").to_owned(),
            instance_id: Uuid::new_v4(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_assigns_distinct_instance_ids() {
        let a = ServiceInfo::new("dust-connectors");
        let b = ServiceInfo::new("dust-connectors");
        assert_eq!(a.name, "dust-connectors");
        assert_ne!(a.instance_id, b.instance_id);
    }
}
