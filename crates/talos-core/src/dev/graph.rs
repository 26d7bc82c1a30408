//! Dependency ordering for dev services.

use std::collections::{HashMap, HashSet};

use super::DevError;
use super::service::Service;

/// Order `services` so every dependency precedes its dependents.
///
/// Depth-first over the services in their given order. Unknown dependency
/// keys are ignored; a back edge fails with the node that closed the cycle.
pub fn topo_sort(services: &[Service]) -> Result<Vec<&Service>, DevError> {
    let by_key: HashMap<&str, &Service> = services.iter().map(|s| (s.key.as_str(), s)).collect();
    let mut visited: HashSet<&str> = HashSet::new();
    let mut on_stack: HashSet<&str> = HashSet::new();
    let mut order = Vec::with_capacity(services.len());

    for service in services {
        visit(service, &by_key, &mut visited, &mut on_stack, &mut order)?;
    }
    Ok(order)
}

fn visit<'a>(
    service: &'a Service,
    by_key: &HashMap<&str, &'a Service>,
    visited: &mut HashSet<&'a str>,
    on_stack: &mut HashSet<&'a str>,
    order: &mut Vec<&'a Service>,
) -> Result<(), DevError> {
    let key = service.key.as_str();
    if on_stack.contains(key) {
        return Err(DevError::DependencyCycle(key.to_string()));
    }
    if visited.contains(key) {
        return Ok(());
    }

    on_stack.insert(key);
    for dep in &service.dependencies {
        if let Some(&next) = by_key.get(dep.as_str()) {
            visit(next, by_key, visited, on_stack, order)?;
        }
    }
    on_stack.remove(key);

    visited.insert(key);
    order.push(service);
    Ok(())
}
