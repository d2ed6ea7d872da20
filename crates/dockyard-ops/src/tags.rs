use dockyard_core::Registry;

/// Registry-qualified tags applied to one built image.
///
/// Order is insertion order: `latest`, then `sha-<short>`, then the caller's
/// extra tag. Duplicates are dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageTagSet {
    image: String,
    tags: Vec<String>,
}

impl ImageTagSet {
    pub fn compute(
        registry: &dyn Registry,
        image_name: &str,
        short_sha: Option<&str>,
        additional_tag: Option<&str>,
    ) -> Self {
        let image = registry.image_path(image_name);
        let mut set = Self {
            image,
            tags: Vec::with_capacity(3),
        };

        set.push("latest");
        if let Some(sha) = short_sha.map(str::trim).filter(|s| !s.is_empty()) {
            set.push(&format!("sha-{sha}"));
        }
        if let Some(extra) = additional_tag.map(str::trim).filter(|t| !t.is_empty()) {
            set.push(extra);
        }
        set
    }

    fn push(&mut self, tag: &str) {
        let full = format!("{}:{tag}", self.image);
        if !self.tags.contains(&full) {
            self.tags.push(full);
        }
    }

    /// Image path without a tag.
    pub fn image(&self) -> &str {
        &self.image
    }

    pub fn as_slice(&self) -> &[String] {
        &self.tags
    }

    pub fn into_vec(self) -> Vec<String> {
        self.tags
    }
}
