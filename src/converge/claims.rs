//! In-process registry of instances currently being converged.
//!
//! Two runs in one process (e.g. a library caller driving several actions
//! at once) must not touch the same instance name, port or path concurrently.

use crate::context::InstanceContext;
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Default)]
struct Claimed {
    names: HashSet<String>,
    ports: HashMap<u16, String>,
    paths: HashMap<PathBuf, String>,
}

#[derive(Default)]
pub struct InstanceClaims {
    state: Mutex<Claimed>,
}

/// Releases its claims on drop.
#[must_use = "claims are released as soon as the guard is dropped"]
pub struct ClaimGuard {
    registry: Arc<InstanceClaims>,
    names: Vec<String>,
    ports: Vec<u16>,
    paths: Vec<PathBuf>,
}

impl InstanceClaims {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Claim every name, port and owned path of `contexts`, all or nothing.
    pub fn claim(self: &Arc<Self>, contexts: &[InstanceContext]) -> Result<ClaimGuard> {
        let mut state = self.state.lock();

        for ctx in contexts {
            if state.names.contains(&ctx.name) {
                return Err(Error::InstanceBusy(ctx.name.clone()));
            }
            if let Some(owner) = state.ports.get(&ctx.port) {
                return Err(Error::AllocationConflict {
                    resource: format!("port {}", ctx.port),
                    first: owner.clone(),
                    second: ctx.name.clone(),
                });
            }
            if let Some((path, owner)) = ctx
                .owned_paths()
                .into_iter()
                .find_map(|p| state.paths.get(p).map(|owner| (p, owner)))
            {
                return Err(Error::AllocationConflict {
                    resource: format!("path {}", path.display()),
                    first: owner.clone(),
                    second: ctx.name.clone(),
                });
            }
        }

        let mut guard = ClaimGuard {
            registry: Arc::clone(self),
            names: Vec::new(),
            ports: Vec::new(),
            paths: Vec::new(),
        };
        for ctx in contexts {
            state.names.insert(ctx.name.clone());
            state.ports.insert(ctx.port, ctx.name.clone());
            guard.names.push(ctx.name.clone());
            guard.ports.push(ctx.port);
            for path in ctx.owned_paths() {
                state.paths.insert(path.to_path_buf(), ctx.name.clone());
                guard.paths.push(path.to_path_buf());
            }
        }

        tracing::debug!("Claimed instances: {}", guard.names.join(", "));
        Ok(guard)
    }

    pub fn is_claimed(&self, name: &str) -> bool {
        self.state.lock().names.contains(name)
    }
}

impl Drop for ClaimGuard {
    fn drop(&mut self) {
        let mut state = self.registry.state.lock();
        for name in &self.names {
            state.names.remove(name);
        }
        for port in &self.ports {
            state.ports.remove(port);
        }
        for path in &self.paths {
            state.paths.remove(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{InstanceSpec, Platform, Roots, ServiceInstance};

    fn ctx(name: &str, port: u16) -> InstanceContext {
        let platform = Platform::new("centos", "7.0");
        let spec = InstanceSpec {
            port,
            ..InstanceSpec::default()
        };
        let instance = ServiceInstance::resolve(name, &spec, &platform).unwrap();
        InstanceContext::derive(&instance, &platform, &Roots::default()).unwrap()
    }

    #[test]
    fn test_claims_released_on_drop() {
        let claims = InstanceClaims::new();
        let guard = claims.claim(&[ctx("default", 3306)]).unwrap();
        assert!(claims.is_claimed("default"));

        assert!(matches!(
            claims.claim(&[ctx("default", 3306)]),
            Err(Error::InstanceBusy(_))
        ));

        drop(guard);
        assert!(!claims.is_claimed("default"));
        let _again = claims.claim(&[ctx("default", 3306)]).unwrap();
    }

    #[test]
    fn test_port_claimed_by_other_instance() {
        let claims = InstanceClaims::new();
        let _guard = claims.claim(&[ctx("a", 3306)]).unwrap();
        match claims.claim(&[ctx("b", 3306)]) {
            Err(Error::AllocationConflict { first, second, .. }) => {
                assert_eq!(first, "a");
                assert_eq!(second, "b");
            }
            other => panic!("expected conflict, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_failed_claim_takes_nothing() {
        let claims = InstanceClaims::new();
        let _guard = claims.claim(&[ctx("a", 3306)]).unwrap();
        assert!(claims.claim(&[ctx("b", 3307), ctx("c", 3306)]).is_err());
        assert!(!claims.is_claimed("b"));
    }
}
