use crate::types::{PreviewPorts, PreviewUrls, Role};

/// Fixed, well-known ports for the preview runtimes.
///
/// Generated frontend code is told at generation time which backend port to
/// call, so ports are a contract baked into generated source and are never
/// negotiated at runtime.
#[derive(Debug, Clone)]
pub struct PortRegistry {
    host: String,
    ports: PreviewPorts,
}

impl PortRegistry {
    pub fn new(host: impl Into<String>, ports: PreviewPorts) -> Self {
        Self {
            host: host.into(),
            ports,
        }
    }

    pub fn ports(&self) -> PreviewPorts {
        self.ports
    }

    pub fn port_for(&self, role: Role) -> u16 {
        self.ports.for_role(role)
    }

    pub fn url_for(&self, role: Role) -> String {
        format!("http://{}:{}", self.host, self.port_for(role))
    }

    pub fn frontend_url(&self) -> String {
        self.url_for(Role::Frontend)
    }

    pub fn backend_url(&self) -> String {
        self.url_for(Role::Backend)
    }

    pub fn urls(&self) -> PreviewUrls {
        PreviewUrls {
            frontend: self.frontend_url(),
            backend: self.backend_url(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls_use_fixed_ports() {
        let registry = PortRegistry::new(
            "localhost",
            PreviewPorts {
                frontend: 5959,
                backend: 7979,
            },
        );

        assert_eq!(registry.port_for(Role::Backend), 7979);
        assert_eq!(registry.backend_url(), "http://localhost:7979");
        assert_eq!(
            registry.urls(),
            PreviewUrls {
                frontend: "http://localhost:5959".to_string(),
                backend: "http://localhost:7979".to_string(),
            }
        );
    }
}
