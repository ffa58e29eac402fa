//! Built-in function library
//!
//! A name-keyed table of plain functions over evaluated arguments. Each
//! argument carries its value and, when the caller passed a variable, the
//! slot it came from so in-place built-ins (`Remove`, `ClearBuffer`,
//! `MakeString`, the gather pair) can write back.
//!
//! Scheduling, file and socket names are registered with a neutral result.
//! The interpreter resolves those names itself before consulting this
//! table, so the entries only matter to callers using the table directly.

mod format;
mod gather;
mod math;
mod strings;
mod time_ops;

pub use format::format;
pub use gather::GatherBuffers;

use crate::scope::SlotKey;
use crate::value::Value;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Services a built-in may use
pub trait BuiltinContext {
    fn print(&mut self, text: &str);
    fn notice(&mut self, message: &str);
    fn get_var(&self, key: &SlotKey) -> Option<Value>;
    fn set_var(&mut self, key: &SlotKey, value: Value);
    /// Last written index of `name`, or of any array when `None`
    fn last_modified_index(&self, name: Option<&str>) -> i64;
    fn array_keys(&self, name: &str) -> Vec<SlotKey>;
    fn gather_buffers(&mut self) -> &mut GatherBuffers;
    /// Hundredths of a second since the interpreter started
    fn ticks(&self) -> i64;
}

/// One evaluated argument
#[derive(Debug, Clone, PartialEq)]
pub struct Arg {
    pub value: Value,
    /// Source slot when the argument was a variable
    pub target: Option<SlotKey>,
}

impl Arg {
    pub fn value(value: impl Into<Value>) -> Self {
        Arg {
            value: value.into(),
            target: None,
        }
    }

    pub fn place(key: SlotKey, value: impl Into<Value>) -> Self {
        Arg {
            value: value.into(),
            target: Some(key),
        }
    }
}

pub type BuiltinFn = fn(&mut dyn BuiltinContext, &[Arg]) -> Value;

type Table = HashMap<&'static str, BuiltinFn>;

pub(crate) fn num(args: &[Arg], idx: usize) -> i64 {
    args.get(idx).map_or(0, |a| a.value.as_number())
}

pub(crate) fn text(args: &[Arg], idx: usize) -> String {
    args.get(idx).map(|a| a.value.as_text()).unwrap_or_default()
}

pub(crate) fn target(args: &[Arg], idx: usize) -> Option<&SlotKey> {
    args.get(idx).and_then(|a| a.target.as_ref())
}

/// Names the interpreter intercepts before this table
const INTERCEPTED: &[&str] = &[
    "DELAY",
    "PROCESSLOGIC",
    "PULSE",
    "CANCELWAIT",
    "CANCELALLWAIT",
    "RETIMEWAIT",
    "CREATETHREAD",
    "ENTERCRITICALSECTION",
    "EXITCRITICALSECTION",
    "STARTFILEOPERATIONS",
    "ENDFILEOPERATIONS",
    "FILEOPEN",
    "FILECLOSE",
    "FILEREAD",
    "FILEWRITE",
    "FILESEEK",
    "FILEDELETE",
    "FILELENGTH",
    "FILEEXISTS",
    "ISDIRECTORY",
    "MAKEDIRECTORY",
    "FINDFIRST",
    "FINDNEXT",
    "FINDCLOSE",
    "SOCKETCONNECTCLIENT",
    "SOCKETDISCONNECTCLIENT",
    "SOCKETSEND",
    "SOCKETGETSTATUS",
    "SOCKETGETADDRESSASREQUESTED",
    "SOCKETGETREMOTEIPADDRESS",
    "SOCKETGETPORTNUMBER",
    "SOCKETSERVERSTARTLISTEN",
    "SOCKETSERVERSTOPLISTEN",
    "SOCKETUDP_ENABLE",
    "SOCKETUDP_DISABLE",
];

fn neutral(_ctx: &mut dyn BuiltinContext, _args: &[Arg]) -> Value {
    Value::zero()
}

fn table() -> &'static Table {
    static TABLE: OnceLock<Table> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut table = Table::new();
        format::register(&mut table);
        strings::register(&mut table);
        gather::register(&mut table);
        math::register(&mut table);
        time_ops::register(&mut table);
        for name in INTERCEPTED {
            table.insert(*name, neutral as BuiltinFn);
        }
        table
    })
}

pub fn lookup(name: &str) -> Option<BuiltinFn> {
    table().get(name.to_ascii_uppercase().as_str()).copied()
}

/// Whether the interpreter handles `name` before the table
pub fn is_intercepted(name: &str) -> bool {
    INTERCEPTED.iter().any(|n| n.eq_ignore_ascii_case(name))
}

pub fn names() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = table().keys().copied().collect();
    names.sort_unstable();
    names
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// In-memory context for exercising built-ins without an interpreter
    #[derive(Debug, Default)]
    pub struct TestContext {
        pub console: String,
        pub notices: Vec<String>,
        pub vars: HashMap<SlotKey, Value>,
        pub gather: GatherBuffers,
        pub last_index: HashMap<String, i64>,
    }

    impl TestContext {
        pub fn with_var(mut self, key: SlotKey, value: impl Into<Value>) -> Self {
            self.vars.insert(key, value.into());
            self
        }

        pub fn var(&self, name: &str) -> Value {
            self.vars
                .get(&SlotKey::plain(name))
                .cloned()
                .unwrap_or_default()
        }

        /// Argument bound to a variable, carrying its current value
        pub fn arg(&self, name: &str) -> Arg {
            Arg::place(SlotKey::plain(name), self.var(name))
        }
    }

    impl BuiltinContext for TestContext {
        fn print(&mut self, text: &str) {
            self.console.push_str(text);
        }

        fn notice(&mut self, message: &str) {
            self.notices.push(message.to_string());
        }

        fn get_var(&self, key: &SlotKey) -> Option<Value> {
            self.vars.get(key).cloned()
        }

        fn set_var(&mut self, key: &SlotKey, value: Value) {
            self.vars.insert(key.clone(), value);
        }

        fn last_modified_index(&self, name: Option<&str>) -> i64 {
            name.and_then(|n| self.last_index.get(&n.to_ascii_uppercase()))
                .copied()
                .unwrap_or(0)
        }

        fn array_keys(&self, name: &str) -> Vec<SlotKey> {
            let mut keys: Vec<SlotKey> = self
                .vars
                .keys()
                .filter(|k| matches!(k, SlotKey::Indexed(..)) && k.owner() == name)
                .cloned()
                .collect();
            keys.sort();
            keys
        }

        fn gather_buffers(&mut self) -> &mut GatherBuffers {
            &mut self.gather
        }

        fn ticks(&self) -> i64 {
            1234
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::TestContext;
    use super::*;

    #[test]
    fn test_every_builtin_name_has_an_entry() {
        for name in splusc::keywords::BUILTIN_NAMES {
            assert!(lookup(name).is_some(), "missing builtin {}", name);
        }
        assert!(lookup("frobnicate").is_none());
        assert!(lookup("print").is_some());
    }

    #[test]
    fn test_intercepted_names_are_neutral_in_the_table() {
        let mut ctx = TestContext::default();
        let open = lookup("FileOpen").unwrap();
        let result = open(&mut ctx, &[Arg::value("/user/x"), Arg::value(0)]);
        assert_eq!(result, Value::zero());

        let send = lookup("SocketSend").unwrap();
        assert_eq!(send(&mut ctx, &[Arg::value(0), Arg::value("PWR ON")]), Value::zero());
        assert!(is_intercepted("socketsend"));
        assert!(!is_intercepted("Left"));
    }

    #[test]
    fn test_names_are_sorted_uppercase() {
        let names = names();
        assert!(names.windows(2).all(|w| w[0] < w[1]));
        assert!(names.iter().all(|n| n.chars().all(|c| !c.is_ascii_lowercase())));
    }
}
