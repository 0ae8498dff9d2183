use std::collections::{HashMap, HashSet};

use riddler_core::error::{Result, RiddleError};

/// Compute a dependency-first execution order.
///
/// Depth-first post-order over `names` in declaration order; each step's
/// dependencies are visited in the order they were listed. The output is
/// deterministic for a given declaration sequence. A step revisited while
/// still on the DFS stack is a cycle and fails with `CircularDependency`.
pub fn order(names: &[String], edges: &HashMap<String, Vec<String>>) -> Result<Vec<String>> {
    let known: HashSet<&str> = names.iter().map(String::as_str).collect();
    let mut visited: HashSet<&str> = HashSet::new();
    let mut visiting: HashSet<&str> = HashSet::new();
    let mut out = Vec::with_capacity(names.len());

    for name in names {
        visit(name, edges, &known, &mut visiting, &mut visited, &mut out)?;
    }
    Ok(out)
}

fn visit<'a>(
    name: &'a str,
    edges: &'a HashMap<String, Vec<String>>,
    known: &HashSet<&str>,
    visiting: &mut HashSet<&'a str>,
    visited: &mut HashSet<&'a str>,
    out: &mut Vec<String>,
) -> Result<()> {
    if visited.contains(name) {
        return Ok(());
    }
    if !visiting.insert(name) {
        return Err(RiddleError::CircularDependency(name.to_string()));
    }

    if let Some(deps) = edges.get(name) {
        for dep in deps {
            if !known.contains(dep.as_str()) {
                return Err(RiddleError::UnknownDependency {
                    step: name.to_string(),
                    dependency: dep.clone(),
                });
            }
            visit(dep, edges, known, visiting, visited, out)?;
        }
    }

    visiting.remove(name);
    visited.insert(name);
    out.push(name.to_string());
    Ok(())
}
