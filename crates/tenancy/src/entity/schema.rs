//! Entity type declarations.

/// A belongs-to association: this entity holds a foreign key to `target`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BelongsTo {
    name: String,
    target: String,
    foreign_key: String,
}

impl BelongsTo {
    /// Association name, e.g. `project`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Referenced entity type, e.g. `Project`.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Attribute holding the referenced primary key, e.g. `project_id`.
    pub fn foreign_key(&self) -> &str {
        &self.foreign_key
    }
}

/// Declares an entity type: its name, primary key and associations.
///
/// ```
/// use helios_tenancy::EntitySchema;
///
/// let task = EntitySchema::new("Task")
///     .belongs_to("account", "Account")
///     .belongs_to("project", "Project");
///
/// assert_eq!(task.primary_key(), "id");
/// assert_eq!(task.association("project").unwrap().foreign_key(), "project_id");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitySchema {
    name: String,
    primary_key: String,
    associations: Vec<BelongsTo>,
}

impl EntitySchema {
    /// Declares an entity type with an `id` primary key.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            primary_key: "id".to_string(),
            associations: Vec::new(),
        }
    }

    /// Overrides the primary key attribute.
    pub fn primary_key_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.primary_key = attribute.into();
        self
    }

    /// Adds a belongs-to association whose foreign key is `<name>_id`.
    pub fn belongs_to(self, name: impl Into<String>, target: impl Into<String>) -> Self {
        let name = name.into();
        let foreign_key = format!("{}_id", name);
        self.belongs_to_via(name, target, foreign_key)
    }

    /// Adds a belongs-to association with an explicit foreign key.
    pub fn belongs_to_via(
        mut self,
        name: impl Into<String>,
        target: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        self.associations.push(BelongsTo {
            name: name.into(),
            target: target.into(),
            foreign_key: foreign_key.into(),
        });
        self
    }

    /// Entity type name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Primary key attribute.
    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    /// Declared associations, in declaration order.
    pub fn associations(&self) -> &[BelongsTo] {
        &self.associations
    }

    /// Looks up an association by name.
    pub fn association(&self, name: &str) -> Option<&BelongsTo> {
        self.associations.iter().find(|a| a.name == name)
    }
}
