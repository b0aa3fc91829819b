//! Orders models so that every table referenced by a foreign key is merged
//! before the table holding that key, using Kahn's algorithm over the
//! schema's relation graph.

use std::collections::{BTreeSet, HashMap, VecDeque};

use crate::schema::Schema;

/// Compute a merge order for every model in `schema`. Ties (models with no
/// remaining dependency at the same step) break by name, so the same schema
/// always produces the same order across runs. If the graph has a cycle,
/// the unresolved models are appended in name order rather than looping
/// forever — a merge with a genuine FK cycle can't be fully satisfied by
/// ordering alone, and the per-row left join already tolerates a missing
/// target by leaving the column null.
pub fn order(schema: &Schema) -> Vec<String> {
    let mut dependents: HashMap<&str, BTreeSet<&str>> = HashMap::new();
    let mut remaining: HashMap<&str, usize> = HashMap::new();

    for name in schema.models.keys() {
        remaining.entry(name.as_str()).or_insert(0);
        dependents.entry(name.as_str()).or_default();
    }

    for model in schema.models.values() {
        for column in &model.columns {
            if let Some(_relation) = &column.relation {
                let target = column.ty.name.as_str();
                if target == model.name || !schema.models.contains_key(target) {
                    continue;
                }
                if dependents.entry(target).or_default().insert(model.name.as_str()) {
                    *remaining.entry(model.name.as_str()).or_insert(0) += 1;
                }
            }
        }
    }

    let mut ready: BTreeSet<&str> = remaining
        .iter()
        .filter(|(_, &count)| count == 0)
        .map(|(&name, _)| name)
        .collect();
    let mut queue: VecDeque<&str> = ready.iter().copied().collect();

    let mut ordered = Vec::with_capacity(remaining.len());
    let mut visited: BTreeSet<&str> = BTreeSet::new();

    while let Some(name) = queue.pop_front() {
        if !visited.insert(name) {
            continue;
        }
        ready.remove(name);
        ordered.push(name.to_string());

        if let Some(children) = dependents.get(name) {
            let mut newly_ready: Vec<&str> = Vec::new();
            for &child in children {
                if let Some(count) = remaining.get_mut(child) {
                    *count -= 1;
                    if *count == 0 {
                        newly_ready.push(child);
                    }
                }
            }
            newly_ready.sort_unstable();
            for child in newly_ready {
                queue.push_back(child);
            }
        }
    }

    if ordered.len() < remaining.len() {
        let mut leftover: Vec<&str> = remaining
            .keys()
            .filter(|name| !visited.contains(*name))
            .copied()
            .collect();
        leftover.sort_unstable();
        ordered.extend(leftover.into_iter().map(String::from));
    }

    ordered
}
