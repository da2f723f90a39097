//! Declarative description of a cross-resource merge.

/// How a merged field's value is carried over.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    /// Copied as is.
    Scalar,
    /// Copied with `"enabled"`/`"disabled"` normalized to booleans.
    Boolean,
    /// A nested structure with its own field set. Legacy single-item lists
    /// and nested blocks are flattened into an object.
    Object(Vec<MergeField>),
}

/// One field copied from an item into the merged collection.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeField {
    pub name: String,
    pub kind: FieldKind,
    /// Parent kinds this field applies to; empty means every kind.
    pub kinds: Vec<String>,
}

impl MergeField {
    pub fn scalar(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Scalar,
            kinds: Vec::new(),
        }
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Boolean,
            kinds: Vec::new(),
        }
    }

    pub fn object(name: impl Into<String>, fields: Vec<MergeField>) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Object(fields),
            kinds: Vec::new(),
        }
    }

    /// Restrict the field to parents of the given kind.
    pub fn for_kind(mut self, kind: impl Into<String>) -> Self {
        self.kinds.push(kind.into());
        self
    }

    /// Whether the field applies to a parent of `kind`. An unknown kind
    /// accepts every field.
    pub fn applies_to(&self, kind: Option<&str>) -> bool {
        match kind {
            Some(kind) if !self.kinds.is_empty() => self.kinds.iter().any(|k| k == kind),
            _ => true,
        }
    }
}

/// Folds resources of `item_type` into a collection attribute of their
/// `parent_type` resource, deleting the item resources afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeRule {
    /// Resource type absorbed by the merge, e.g. `cloudflare_list_item`.
    pub item_type: String,
    /// Resource type receiving the items, e.g. `cloudflare_list`.
    pub parent_type: String,
    /// Item attribute holding the parent reference (config) or id (state).
    pub parent_ref_attribute: String,
    /// Parent state attribute the item reference is compared with.
    pub parent_id_attribute: String,
    /// Parent attribute receiving the merged collection.
    pub target_attribute: String,
    /// Parent state attribute recording the collection length.
    pub count_attribute: Option<String>,
    /// Parent attribute selecting which fields apply.
    pub kind_attribute: Option<String>,
    pub fields: Vec<MergeField>,
}

impl MergeRule {
    pub fn new(
        item_type: impl Into<String>,
        parent_type: impl Into<String>,
        target_attribute: impl Into<String>,
    ) -> Self {
        Self {
            item_type: item_type.into(),
            parent_type: parent_type.into(),
            parent_ref_attribute: "parent_id".to_string(),
            parent_id_attribute: "id".to_string(),
            target_attribute: target_attribute.into(),
            count_attribute: None,
            kind_attribute: None,
            fields: Vec::new(),
        }
    }

    pub fn with_parent_ref(mut self, attribute: impl Into<String>) -> Self {
        self.parent_ref_attribute = attribute.into();
        self
    }

    pub fn with_parent_id(mut self, attribute: impl Into<String>) -> Self {
        self.parent_id_attribute = attribute.into();
        self
    }

    pub fn with_count(mut self, attribute: impl Into<String>) -> Self {
        self.count_attribute = Some(attribute.into());
        self
    }

    pub fn with_kind(mut self, attribute: impl Into<String>) -> Self {
        self.kind_attribute = Some(attribute.into());
        self
    }

    pub fn with_field(mut self, field: MergeField) -> Self {
        self.fields.push(field);
        self
    }

    /// Fields applicable to a parent of the given kind.
    pub fn fields_for(&self, kind: Option<&str>) -> impl Iterator<Item = &MergeField> {
        let kind = kind.map(str::to_string);
        self.fields
            .iter()
            .filter(move |f| f.applies_to(kind.as_deref()))
    }
}
