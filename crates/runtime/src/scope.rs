//! Variable storage
//!
//! Every addressable location is a [`Slot`] under a structured
//! [`SlotKey`]. Arrays, two-dimension arrays and structure fields are
//! flattened into one slot per element when declared. A [`Scope`] is the
//! stack of call frames above the global frame; lookups walk the frames
//! innermost first and end at the globals.

use crate::value::{IntWidth, Value};
use splusc::ast::{StructDef, VarDecl, VarType};
use std::collections::HashMap;
use std::fmt;

/// Capacity of a `STRING` declared without a size
pub const DEFAULT_STRING_CAPACITY: usize = 255;
/// Capacity of string parameters and other unsized text slots
pub const MAX_STRING_CAPACITY: usize = 65535;

/// Uppercase-normalized address of a slot
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SlotKey {
    Plain(String),
    Indexed(String, i64),
    Indexed2(String, i64, i64),
    Field(String, String),
    IndexedField(String, String, i64),
}

impl SlotKey {
    pub fn plain(name: &str) -> Self {
        SlotKey::Plain(name.to_ascii_uppercase())
    }

    pub fn indexed(name: &str, index: i64) -> Self {
        SlotKey::Indexed(name.to_ascii_uppercase(), index)
    }

    pub fn field(object: &str, field: &str) -> Self {
        SlotKey::Field(object.to_ascii_uppercase(), field.to_ascii_uppercase())
    }

    /// Parse the display form: `x`, `x[1]`, `x[1][2]`, `p.f`, `p.f[3]`
    pub fn parse(text: &str) -> Option<SlotKey> {
        let text = text.trim();
        let (head, mut rest) = match text.find('[') {
            Some(i) => (&text[..i], &text[i..]),
            None => (text, ""),
        };
        if head.is_empty() {
            return None;
        }
        let mut indices = Vec::new();
        while !rest.is_empty() {
            let inner = rest.strip_prefix('[')?;
            let close = inner.find(']')?;
            indices.push(inner[..close].trim().parse::<i64>().ok()?);
            rest = &inner[close + 1..];
        }
        match (head.split_once('.'), indices.as_slice()) {
            (None, []) => Some(SlotKey::plain(head)),
            (None, [i]) => Some(SlotKey::indexed(head, *i)),
            (None, [i, j]) => Some(SlotKey::Indexed2(head.to_ascii_uppercase(), *i, *j)),
            (Some((o, f)), []) => Some(SlotKey::field(o, f)),
            (Some((o, f)), [i]) => Some(SlotKey::IndexedField(
                o.to_ascii_uppercase(),
                f.to_ascii_uppercase(),
                *i,
            )),
            _ => None,
        }
    }

    /// Variable or structure instance that owns the slot
    pub fn owner(&self) -> &str {
        match self {
            SlotKey::Plain(n) | SlotKey::Indexed(n, _) | SlotKey::Indexed2(n, _, _) => n,
            SlotKey::Field(o, _) | SlotKey::IndexedField(o, _, _) => o,
        }
    }

    /// Name used for last-modified-index tracking
    pub fn array_name(&self) -> Option<String> {
        match self {
            SlotKey::Indexed(n, _) | SlotKey::Indexed2(n, _, _) => Some(n.clone()),
            SlotKey::IndexedField(o, f, _) => Some(format!("{}.{}", o, f)),
            _ => None,
        }
    }

    pub fn first_index(&self) -> Option<i64> {
        match self {
            SlotKey::Indexed(_, i) | SlotKey::Indexed2(_, i, _) | SlotKey::IndexedField(_, _, i) => {
                Some(*i)
            }
            _ => None,
        }
    }

    /// Same slot shape under a different owner (array and structure
    /// arguments are copied into the callee under the parameter's name)
    pub fn rebase(&self, owner: &str) -> SlotKey {
        let owner = owner.to_ascii_uppercase();
        match self {
            SlotKey::Plain(_) => SlotKey::Plain(owner),
            SlotKey::Indexed(_, i) => SlotKey::Indexed(owner, *i),
            SlotKey::Indexed2(_, i, j) => SlotKey::Indexed2(owner, *i, *j),
            SlotKey::Field(_, f) => SlotKey::Field(owner, f.clone()),
            SlotKey::IndexedField(_, f, i) => SlotKey::IndexedField(owner, f.clone(), *i),
        }
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotKey::Plain(n) => write!(f, "{}", n),
            SlotKey::Indexed(n, i) => write!(f, "{}[{}]", n, i),
            SlotKey::Indexed2(n, i, j) => write!(f, "{}[{}][{}]", n, i, j),
            SlotKey::Field(o, field) => write!(f, "{}.{}", o, field),
            SlotKey::IndexedField(o, field, i) => write!(f, "{}.{}[{}]", o, field, i),
        }
    }
}

/// What a slot accepts on write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    Int(IntWidth),
    Str { capacity: usize },
    Untyped,
}

impl SlotKind {
    pub fn initial(self) -> Value {
        match self {
            SlotKind::Str { .. } => Value::empty_text(),
            _ => Value::zero(),
        }
    }

    /// Width-wrap integers, truncate strings to capacity
    pub fn coerce(self, value: Value) -> Value {
        match self {
            SlotKind::Int(width) => Value::Number(width.wrap(value.as_number())),
            SlotKind::Str { capacity } => {
                let text = value.as_text();
                if text.chars().count() > capacity {
                    Value::Text(text.chars().take(capacity).collect())
                } else {
                    Value::Text(text)
                }
            }
            SlotKind::Untyped => value,
        }
    }

    pub fn for_type(ty: &VarType, capacity: usize) -> SlotKind {
        match IntWidth::for_type(ty) {
            Some(width) => SlotKind::Int(width),
            None if *ty == VarType::String => SlotKind::Str { capacity },
            None => SlotKind::Untyped,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Slot {
    pub value: Value,
    pub kind: SlotKind,
}

impl Slot {
    pub fn new(kind: SlotKind) -> Self {
        Slot {
            value: kind.initial(),
            kind,
        }
    }

    pub fn set(&mut self, value: Value) {
        self.value = self.kind.coerce(value);
    }
}

/// Element layout of one declaration
enum Shape {
    Scalar,
    /// Indices `0..=n`
    Array(usize),
    Grid(usize, usize),
}

fn layout(decl: &VarDecl) -> (SlotKind, Shape) {
    match (&decl.ty, decl.array_size, decl.initial_size) {
        (VarType::String, None, _) => (
            SlotKind::Str {
                capacity: DEFAULT_STRING_CAPACITY,
            },
            Shape::Scalar,
        ),
        (VarType::String, Some(capacity), None) => (SlotKind::Str { capacity }, Shape::Scalar),
        (VarType::String, Some(n), Some(capacity)) => {
            (SlotKind::Str { capacity }, Shape::Array(n))
        }
        (ty, None, _) => (SlotKind::for_type(ty, MAX_STRING_CAPACITY), Shape::Scalar),
        (ty, Some(n), None) => (SlotKind::for_type(ty, MAX_STRING_CAPACITY), Shape::Array(n)),
        (ty, Some(n), Some(m)) => (SlotKind::for_type(ty, MAX_STRING_CAPACITY), Shape::Grid(n, m)),
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    slots: HashMap<SlotKey, Slot>,
}

impl Frame {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare(&mut self, key: SlotKey, kind: SlotKind) {
        self.slots.insert(key, Slot::new(kind));
    }

    pub fn insert(&mut self, key: SlotKey, slot: Slot) {
        self.slots.insert(key, slot);
    }

    pub fn get(&self, key: &SlotKey) -> Option<&Slot> {
        self.slots.get(key)
    }

    pub fn get_mut(&mut self, key: &SlotKey) -> Option<&mut Slot> {
        self.slots.get_mut(key)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Slots owned by `name` (array elements or structure fields)
    pub fn owned_by(&self, name: &str) -> Vec<(SlotKey, Slot)> {
        let mut owned: Vec<(SlotKey, Slot)> = self
            .slots
            .iter()
            .filter(|(k, _)| !matches!(k, SlotKey::Plain(_)) && k.owner() == name)
            .map(|(k, s)| (k.clone(), s.clone()))
            .collect();
        owned.sort_by(|a, b| a.0.cmp(&b.0));
        owned
    }

    /// Declare every slot of a variable, array or structure instance
    pub fn declare_var(&mut self, decl: &VarDecl, structs: &[StructDef]) -> Result<(), String> {
        let name = decl.name.to_ascii_uppercase();

        if let VarType::Struct(type_name) = &decl.ty {
            let def = structs
                .iter()
                .find(|s| s.name.eq_ignore_ascii_case(type_name))
                .ok_or_else(|| format!("Unknown structure type '{}'", type_name))?;
            for field in &def.fields {
                let field_name = field.name.to_ascii_uppercase();
                let (kind, shape) = layout(field);
                match shape {
                    Shape::Scalar => self.declare(SlotKey::Field(name.clone(), field_name), kind),
                    // Structure fields carry at most one index
                    Shape::Array(n) | Shape::Grid(n, _) => {
                        for i in 0..=n as i64 {
                            self.declare(
                                SlotKey::IndexedField(name.clone(), field_name.clone(), i),
                                kind,
                            );
                        }
                    }
                }
            }
            return Ok(());
        }

        let (kind, shape) = layout(decl);
        match shape {
            Shape::Scalar => self.declare(SlotKey::Plain(name), kind),
            Shape::Array(n) => {
                for i in 0..=n as i64 {
                    self.declare(SlotKey::Indexed(name.clone(), i), kind);
                }
            }
            Shape::Grid(n, m) => {
                for i in 0..=n as i64 {
                    for j in 0..=m as i64 {
                        self.declare(SlotKey::Indexed2(name.clone(), i, j), kind);
                    }
                }
            }
        }
        Ok(())
    }
}

/// Call frames above the global frame
#[derive(Debug, Clone, Default)]
pub struct Scope {
    frames: Vec<Frame>,
    globals: Frame,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn globals(&self) -> &Frame {
        &self.globals
    }

    pub fn globals_mut(&mut self) -> &mut Frame {
        &mut self.globals
    }

    pub fn push(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    pub fn pop(&mut self) -> Option<Frame> {
        self.frames.pop()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Swap the frame stack out (isolated handler and timer runs)
    pub fn replace_frames(&mut self, frames: Vec<Frame>) -> Vec<Frame> {
        std::mem::replace(&mut self.frames, frames)
    }

    /// Copy of the frame stack for deferred wait bodies
    pub fn snapshot(&self) -> Vec<Frame> {
        self.frames.clone()
    }

    fn chain(&self) -> impl Iterator<Item = &Frame> {
        self.frames.iter().rev().chain(std::iter::once(&self.globals))
    }

    pub fn get(&self, key: &SlotKey) -> Option<&Slot> {
        self.chain().find_map(|f| f.get(key))
    }

    pub fn get_mut(&mut self, key: &SlotKey) -> Option<&mut Slot> {
        self.frames
            .iter_mut()
            .rev()
            .chain(std::iter::once(&mut self.globals))
            .find_map(|f| f.get_mut(key))
    }

    pub fn is_array(&self, name: &str) -> bool {
        let name = name.to_ascii_uppercase();
        self.get(&SlotKey::Indexed(name.clone(), 0)).is_some()
            || self.get(&SlotKey::Indexed2(name, 0, 0)).is_some()
    }

    /// Element and field slots of `name` from the innermost frame owning any
    pub fn owned_by(&self, name: &str) -> Vec<(SlotKey, Slot)> {
        let name = name.to_ascii_uppercase();
        self.chain()
            .map(|f| f.owned_by(&name))
            .find(|owned| !owned.is_empty())
            .unwrap_or_default()
    }

    pub fn array_keys(&self, name: &str) -> Vec<SlotKey> {
        self.owned_by(name)
            .into_iter()
            .map(|(k, _)| k)
            .filter(|k| matches!(k, SlotKey::Indexed(..) | SlotKey::Indexed2(..)))
            .collect()
    }

    pub fn clear(&mut self) {
        self.frames.clear();
        self.globals = Frame::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use splusc::ast::Position;

    fn decl(ty: VarType, name: &str, a: Option<usize>, b: Option<usize>) -> VarDecl {
        VarDecl {
            ty,
            name: name.to_string(),
            array_size: a,
            initial_size: b,
            pos: Position::default(),
        }
    }

    #[test]
    fn test_integer_array_holds_zero_through_n() {
        let mut frame = Frame::new();
        frame
            .declare_var(&decl(VarType::Integer, "vals", Some(3), None), &[])
            .unwrap();
        assert_eq!(frame.len(), 4);
        assert!(frame.get(&SlotKey::indexed("vals", 0)).is_some());
        assert!(frame.get(&SlotKey::indexed("vals", 3)).is_some());
        assert!(frame.get(&SlotKey::indexed("vals", 4)).is_none());
    }

    #[test]
    fn test_string_dimensions() {
        let mut frame = Frame::new();
        frame
            .declare_var(&decl(VarType::String, "name", Some(8), None), &[])
            .unwrap();
        frame
            .declare_var(&decl(VarType::String, "rows", Some(2), Some(4)), &[])
            .unwrap();

        let slot = frame.get_mut(&SlotKey::plain("name")).unwrap();
        slot.set(Value::from("truncated text"));
        assert_eq!(slot.value, Value::from("truncate"));

        let row = frame.get_mut(&SlotKey::indexed("rows", 2)).unwrap();
        row.set(Value::from("abcdef"));
        assert_eq!(row.value, Value::from("abcd"));
    }

    #[test]
    fn test_grid_and_wrapping_slots() {
        let mut frame = Frame::new();
        frame
            .declare_var(&decl(VarType::SignedInteger, "grid", Some(2), Some(3)), &[])
            .unwrap();
        assert_eq!(frame.len(), 12);
        let cell = frame.get_mut(&SlotKey::Indexed2("GRID".into(), 2, 3)).unwrap();
        cell.set(Value::Number(32768));
        assert_eq!(cell.value, Value::Number(-32768));
    }

    #[test]
    fn test_structure_instance_is_flattened() {
        let def = StructDef {
            name: "Preset".to_string(),
            fields: vec![
                decl(VarType::Integer, "level", None, None),
                decl(VarType::String, "label", Some(10), None),
                decl(VarType::Integer, "slots", Some(2), None),
            ],
            pos: Position::default(),
        };
        let mut frame = Frame::new();
        frame
            .declare_var(
                &decl(VarType::Struct("preset".into()), "current", None, None),
                &[def],
            )
            .unwrap();
        assert!(frame.get(&SlotKey::field("current", "level")).is_some());
        assert!(frame.get(&SlotKey::field("current", "label")).is_some());
        assert!(
            frame
                .get(&SlotKey::IndexedField("CURRENT".into(), "SLOTS".into(), 2))
                .is_some()
        );
        assert_eq!(frame.owned_by("CURRENT").len(), 5);
    }

    #[test]
    fn test_unknown_structure_type_is_an_error() {
        let mut frame = Frame::new();
        let err = frame
            .declare_var(&decl(VarType::Struct("Nope".into()), "x", None, None), &[])
            .unwrap_err();
        assert!(err.contains("Nope"));
    }

    #[test]
    fn test_lookup_walks_innermost_first() {
        let mut scope = Scope::new();
        scope
            .globals_mut()
            .declare(SlotKey::plain("x"), SlotKind::Untyped);
        scope
            .get_mut(&SlotKey::plain("x"))
            .unwrap()
            .set(Value::Number(1));

        let mut frame = Frame::new();
        frame.declare(SlotKey::plain("x"), SlotKind::Untyped);
        scope.push(frame);
        scope
            .get_mut(&SlotKey::plain("x"))
            .unwrap()
            .set(Value::Number(2));

        assert_eq!(scope.get(&SlotKey::plain("x")).unwrap().value, Value::Number(2));
        scope.pop();
        assert_eq!(scope.get(&SlotKey::plain("x")).unwrap().value, Value::Number(1));
    }

    #[test]
    fn test_key_display_and_rebase() {
        let key = SlotKey::IndexedField("P".into(), "SLOTS".into(), 3);
        assert_eq!(key.to_string(), "P.SLOTS[3]");
        assert_eq!(key.rebase("q").to_string(), "Q.SLOTS[3]");
        assert_eq!(key.array_name().as_deref(), Some("P.SLOTS"));
    }

    #[test]
    fn test_key_parse() {
        assert_eq!(SlotKey::parse("level"), Some(SlotKey::plain("LEVEL")));
        assert_eq!(SlotKey::parse("vals[2]"), Some(SlotKey::indexed("vals", 2)));
        assert_eq!(
            SlotKey::parse("grid[1][ 3]"),
            Some(SlotKey::Indexed2("GRID".into(), 1, 3))
        );
        assert_eq!(SlotKey::parse("p.slots[3]").unwrap().to_string(), "P.SLOTS[3]");
        assert_eq!(SlotKey::parse("vals[x]"), None);
        assert_eq!(SlotKey::parse("[1]"), None);
    }
}
