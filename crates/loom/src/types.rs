//! The `DataType` algebra (spec.md §3).
//!
//! A `DataType` is exactly one of: a primitive, a function signature, or a
//! named struct. Equality is primitive-equality on `Simple`, pointwise on
//! `Function`, and nominal (name-only) on `Struct`.

use std::fmt;

use indexmap::IndexMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    Int,
    Float,
    String,
    Bool,
    Void,
    /// Marks an identifier as naming *some* struct type before `CollectTypes`
    /// has resolved which one (transient, assigned by `InfereIdentifierTypes`
    /// to a `DeclStruct`'s own identifier).
    StructTag,
    /// Not yet known; the fixpoint's "no progress yet" state.
    Unknown,
    /// Two incompatible resolved types were observed for the same node.
    Conflict,
    /// The type of an expression that deliberately has no value (e.g. a
    /// bare `print()` call in the original's built-in table).
    None,
}

impl Primitive {
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "int" => Self::Int,
            "float" => Self::Float,
            "string" => Self::String,
            "bool" => Self::Bool,
            "void" => Self::Void,
            "conflict" => Self::Conflict,
            "none" => Self::None,
            _ => return None,
        })
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Int => "int",
            Self::Float => "float",
            Self::String => "string",
            Self::Bool => "bool",
            Self::Void => "void",
            Self::StructTag => "struct",
            Self::Unknown => "unknown",
            Self::Conflict => "conflict",
            Self::None => "none",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionType {
    pub params: Vec<DataType>,
    pub ret: Box<DataType>,
    pub is_extern: bool,
}

#[derive(Debug, Clone)]
pub struct StructField {
    pub ty: DataType,
    /// `None` until `UpdateOffsets` assigns a stable word offset.
    pub offset: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct StructType {
    pub name: String,
    /// Declaration-ordered fields; offsets are computed from this order.
    pub fields: IndexMap<String, StructField>,
}

impl StructType {
    #[must_use]
    pub fn memory_size(&self) -> usize {
        self.fields.values().map(|field| field.ty.memory_size()).sum()
    }
}

impl PartialEq for StructType {
    /// Nominal typing: two struct types are equal iff they share a name.
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DataType {
    Simple(Primitive),
    Function(FunctionType),
    Struct(StructType),
}

impl DataType {
    #[must_use]
    pub const fn unknown() -> Self {
        Self::Simple(Primitive::Unknown)
    }

    #[must_use]
    pub const fn conflict() -> Self {
        Self::Simple(Primitive::Conflict)
    }

    #[must_use]
    pub const fn void() -> Self {
        Self::Simple(Primitive::Void)
    }

    #[must_use]
    pub fn function(params: Vec<Self>, ret: Self, is_extern: bool) -> Self {
        Self::Function(FunctionType { params, ret: Box::new(ret), is_extern })
    }

    #[must_use]
    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Simple(Primitive::Unknown))
    }

    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Simple(Primitive::Conflict))
    }

    #[must_use]
    pub fn is_resolved(&self) -> bool {
        !self.is_unknown() && !self.is_conflict()
    }

    #[must_use]
    pub fn is_struct(&self) -> bool {
        matches!(self, Self::Struct(_))
    }

    #[must_use]
    pub fn is_function(&self) -> bool {
        matches!(self, Self::Function(_))
    }

    #[must_use]
    pub fn as_struct(&self) -> Option<&StructType> {
        match self {
            Self::Struct(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_struct_mut(&mut self) -> Option<&mut StructType> {
        match self {
            Self::Struct(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_function(&self) -> Option<&FunctionType> {
        match self {
            Self::Function(f) => Some(f),
            _ => None,
        }
    }

    /// Memory size in words: 1 for simple and function types, the sum of
    /// field sizes for structs (spec.md §3).
    #[must_use]
    pub fn memory_size(&self) -> usize {
        match self {
            Self::Simple(_) | Self::Function(_) => 1,
            Self::Struct(s) => s.memory_size(),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Simple(p) => write!(f, "{p}"),
            Self::Function(func) => {
                write!(f, "(")?;
                for (i, param) in func.params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{param}")?;
                }
                write!(f, ") -> {}", func.ret)?;
                if func.is_extern {
                    write!(f, " [extern]")?;
                }
                Ok(())
            }
            Self::Struct(s) => write!(f, "{}", s.name),
        }
    }
}

/// Updates `slot` to `new`, following spec.md §4.4's idempotent/conflict
/// rule: equal values are a no-op, an `Unknown` slot adopts `new`, an
/// `Unknown` `new` is ignored, and two different resolved values collapse
/// the slot to `Conflict` and report `message`.
pub fn set_data_type(slot: &mut DataType, new: DataType, mut on_message: impl FnMut(String)) {
    if *slot == new {
        return;
    }
    if slot.is_unknown() {
        *slot = new;
    } else if new.is_unknown() {
        // Keep the already-resolved type; nothing learned.
    } else {
        on_message(format!("Conflicting types: {slot} vs {new}"));
        *slot = DataType::conflict();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_equality_is_primitive_equality() {
        assert_eq!(DataType::Simple(Primitive::Int), DataType::Simple(Primitive::Int));
        assert_ne!(DataType::Simple(Primitive::Int), DataType::Simple(Primitive::Bool));
    }

    #[test]
    fn function_equality_is_pointwise() {
        let a = DataType::function(vec![DataType::Simple(Primitive::Int)], DataType::Simple(Primitive::Bool), false);
        let b = DataType::function(vec![DataType::Simple(Primitive::Int)], DataType::Simple(Primitive::Bool), false);
        let c = DataType::function(vec![DataType::Simple(Primitive::Int)], DataType::Simple(Primitive::Bool), true);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn struct_equality_is_nominal() {
        let mut fields_a = IndexMap::new();
        fields_a.insert("x".to_owned(), StructField { ty: DataType::Simple(Primitive::Int), offset: Some(0) });
        let mut fields_b = IndexMap::new();
        // Different field set, same name: still equal, by spec.
        let a = DataType::Struct(StructType { name: "P".to_owned(), fields: fields_a });
        fields_b.insert("y".to_owned(), StructField { ty: DataType::Simple(Primitive::Float), offset: Some(0) });
        let b = DataType::Struct(StructType { name: "P".to_owned(), fields: fields_b });
        assert_eq!(a, b);
    }

    #[test]
    fn struct_memory_size_sums_field_sizes() {
        let mut fields = IndexMap::new();
        fields.insert("x".to_owned(), StructField { ty: DataType::Simple(Primitive::Int), offset: Some(0) });
        fields.insert("y".to_owned(), StructField { ty: DataType::Simple(Primitive::Int), offset: Some(1) });
        let s = StructType { name: "P".to_owned(), fields };
        assert_eq!(s.memory_size(), 2);
    }

    #[test]
    fn set_data_type_resolves_unknown_then_conflicts_on_mismatch() {
        let mut slot = DataType::unknown();
        let mut messages = Vec::new();
        set_data_type(&mut slot, DataType::Simple(Primitive::Int), |m| messages.push(m));
        assert_eq!(slot, DataType::Simple(Primitive::Int));
        assert!(messages.is_empty());

        set_data_type(&mut slot, DataType::Simple(Primitive::Bool), |m| messages.push(m));
        assert!(slot.is_conflict());
        assert_eq!(messages.len(), 1);
    }

    #[test]
    fn set_data_type_is_idempotent_on_equal_values() {
        let mut slot = DataType::Simple(Primitive::Int);
        let mut messages = Vec::new();
        set_data_type(&mut slot, DataType::Simple(Primitive::Int), |m| messages.push(m));
        assert_eq!(slot, DataType::Simple(Primitive::Int));
        assert!(messages.is_empty());
    }
}
