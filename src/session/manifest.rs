use crate::content::{extension_of, Category};
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};

/// Hard cap on queued names per category. Anything past this is dropped
/// rather than growing without bound on adversarial input.
const MAX_QUEUED_NAMES: usize = 1024;

/// A bounded FIFO of caller-requested member names for one category.
#[derive(Debug, Default, Clone)]
pub struct NameQueue {
    names: VecDeque<String>,
}

impl NameQueue {
    pub fn push(&mut self, name: String) {
        if self.names.len() < MAX_QUEUED_NAMES {
            self.names.push_back(name);
        }
    }

    pub fn pop(&mut self) -> Option<String> {
        self.names.pop_front()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Caller-supplied member names, parsed from a JSON object keyed either by
/// category (`"images": [...]`) or by extension (`"png": [...]`). Values may
/// be a single string or an array of strings; anything else is ignored.
#[derive(Debug, Default, Clone)]
pub struct NamingManifest {
    queues: HashMap<Category, NameQueue>,
}

impl NamingManifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tolerant parse: malformed JSON or an unexpected shape yields an
    /// empty manifest, never an error.
    pub fn parse_str(input: &str) -> Self {
        match serde_json::from_str::<Value>(input) {
            Ok(value) => Self::parse(&value),
            Err(_) => Self::default(),
        }
    }

    pub fn parse(value: &Value) -> Self {
        let mut manifest = Self::default();
        let Some(object) = value.as_object() else {
            return manifest;
        };

        for (key, entry) in object {
            let category = match Self::category_for_key(key) {
                Some(category) => category,
                None => continue,
            };

            match entry {
                Value::String(name) => manifest.queue_name(category, name),
                Value::Array(names) => {
                    for name in names {
                        if let Value::String(name) = name {
                            manifest.queue_name(category, name);
                        }
                    }
                }
                _ => {}
            }
        }

        manifest
    }

    fn category_for_key(key: &str) -> Option<Category> {
        if let Some(category) = Category::from_name(key) {
            return Some(category);
        }
        let ext = key.trim().trim_start_matches('.').to_lowercase();
        Category::for_extension(&ext)
    }

    fn queue_name(&mut self, category: Category, name: &str) {
        let name = name.trim();
        if name.is_empty() {
            return;
        }
        self.queues
            .entry(category)
            .or_default()
            .push(name.to_string());
    }

    /// Consume the next queued name for `category`, if any.
    pub fn next_name(&mut self, category: Category) -> Option<String> {
        self.queues.get_mut(&category).and_then(NameQueue::pop)
    }

    pub fn queued(&self, category: Category) -> usize {
        self.queues.get(&category).map(NameQueue::len).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.queues.values().all(NameQueue::is_empty)
    }

    /// Append all of `other`'s queues after this manifest's own.
    pub fn merge(&mut self, mut other: NamingManifest) {
        for (category, queue) in other.queues.drain() {
            let target = self.queues.entry(category).or_default();
            for name in queue.names {
                target.push(name);
            }
        }
    }

    /// Split into the names whose extension is in `extensions` and the
    /// rest, preserving queue order on both sides.
    pub fn split<'a, I>(self, extensions: I) -> (NamingManifest, NamingManifest)
    where
        I: IntoIterator<Item = &'a str>,
    {
        let wanted: HashSet<String> = extensions
            .into_iter()
            .map(|e| e.trim().trim_start_matches('.').to_lowercase())
            .collect();

        let mut matched = NamingManifest::new();
        let mut rest = NamingManifest::new();
        for (category, queue) in self.queues {
            for name in queue.names {
                let target = if wanted.contains(&extension_of(&name)) {
                    &mut matched
                } else {
                    &mut rest
                };
                target.queues.entry(category).or_default().push(name);
            }
        }
        (matched, rest)
    }
}

/// Build a category-keyed manifest value from a flat list of member names,
/// routing each by its extension. Names with unknown extensions are dropped.
pub fn manifest_from_names<I, S>(names: I) -> Value
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut buckets: HashMap<Category, Vec<Value>> = HashMap::new();
    for name in names {
        let name = name.as_ref().trim();
        if name.is_empty() {
            continue;
        }
        if let Some(category) = Category::for_extension(&extension_of(name)) {
            buckets
                .entry(category)
                .or_default()
                .push(Value::String(name.to_string()));
        }
    }

    let mut object = serde_json::Map::new();
    for (category, names) in buckets {
        object.insert(category.as_str().to_string(), Value::Array(names));
    }
    Value::Object(object)
}
