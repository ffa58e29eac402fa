//! Reserved word tables
//!
//! The lexer classifies every identifier-shaped lexeme against four disjoint
//! sets. Matching is case-insensitive; the tables hold uppercase spellings.

/// Control keywords, handler triggers and declaration modifiers
pub const CONTROL_KEYWORDS: &[&str] = &[
    "IF",
    "ELSE",
    "FOR",
    "TO",
    "STEP",
    "WHILE",
    "DO",
    "UNTIL",
    "SWITCH",
    "CSWITCH",
    "CASE",
    "DEFAULT",
    "WAIT",
    "RETURN",
    "BREAK",
    "TERMINATEEVENT",
    "FUNCTION",
    "INTEGER_FUNCTION",
    "LONG_INTEGER_FUNCTION",
    "SIGNED_INTEGER_FUNCTION",
    "SIGNED_LONG_INTEGER_FUNCTION",
    "STRING_FUNCTION",
    "PUSH",
    "RELEASE",
    "CHANGE",
    "SOCKETCONNECT",
    "SOCKETDISCONNECT",
    "SOCKETRECEIVE",
    "STRUCTURE",
    "BYREF",
    "BYVAL",
    "THREADSAFE",
    "VOLATILE",
    "NONVOLATILE",
    "NOT",
    "MOD",
];

pub const IO_TYPES: &[&str] = &[
    "DIGITAL_INPUT",
    "DIGITAL_OUTPUT",
    "ANALOG_INPUT",
    "ANALOG_OUTPUT",
    "STRING_INPUT",
    "STRING_OUTPUT",
    "BUFFER_INPUT",
];

pub const VAR_TYPES: &[&str] = &[
    "INTEGER",
    "LONG_INTEGER",
    "SIGNED_INTEGER",
    "SIGNED_LONG_INTEGER",
    "STRING",
    "TCP_CLIENT",
    "TCP_SERVER",
    "UDP_SOCKET",
];

/// Every callable the runtime provides, whether it is served by the
/// built-in library or intercepted by the interpreter itself.
pub const BUILTIN_NAMES: &[&str] = &[
    // Output and formatting
    "PRINT",
    "TRACE",
    "MAKESTRING",
    "GENERATEUSERNOTICE",
    "GENERATEUSERWARNING",
    "GENERATEUSERERROR",
    // Conversions
    "ITOA",
    "ITOHEX",
    "LTOA",
    "LTOHEX",
    "ATOI",
    "ATOL",
    "CHR",
    "BYTE",
    "LEN",
    // String manipulation
    "LEFT",
    "RIGHT",
    "MID",
    "FIND",
    "REVERSEFIND",
    "UPPER",
    "LOWER",
    "REMOVE",
    "REMOVEBYLENGTH",
    "CLEARBUFFER",
    "SETSTRING",
    "GATHERASYNC",
    "GATHERASYNCBYLENGTH",
    // Math
    "MIN",
    "MAX",
    "SMIN",
    "SMAX",
    "ABS",
    "MULDIV",
    "RANDOM",
    // Arrays
    "SETARRAY",
    "RESIZEARRAY",
    "GETLASTMODIFIEDARRAYINDEX",
    // Date and time
    "DATE",
    "TIME",
    "DAY",
    "MONTH",
    "GETDATENUM",
    "GETMONTHNUM",
    "GETYEARNUM",
    "GETHOURNUM",
    "GETMINUTESNUM",
    "GETSECONDSNUM",
    "GETDAYOFWEEKNUM",
    "GETTICKS",
    // Scheduling
    "DELAY",
    "PROCESSLOGIC",
    "PULSE",
    "CANCELWAIT",
    "CANCELALLWAIT",
    "RETIMEWAIT",
    "CREATETHREAD",
    "ENTERCRITICALSECTION",
    "EXITCRITICALSECTION",
    // Files
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
    // Sockets
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

fn contains(table: &[&str], word: &str) -> bool {
    table.iter().any(|k| k.eq_ignore_ascii_case(word))
}

pub fn is_control_keyword(word: &str) -> bool {
    contains(CONTROL_KEYWORDS, word)
}

pub fn is_io_type(word: &str) -> bool {
    contains(IO_TYPES, word)
}

pub fn is_var_type(word: &str) -> bool {
    contains(VAR_TYPES, word)
}

pub fn is_builtin(word: &str) -> bool {
    contains(BUILTIN_NAMES, word)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_tables_are_disjoint() {
        let mut seen = HashSet::new();
        for word in CONTROL_KEYWORDS
            .iter()
            .chain(IO_TYPES)
            .chain(VAR_TYPES)
            .chain(BUILTIN_NAMES)
        {
            assert!(seen.insert(*word), "'{}' appears in two tables", word);
        }
    }

    #[test]
    fn test_lookup_ignores_case() {
        assert!(is_control_keyword("cSwitch"));
        assert!(is_io_type("Buffer_Input"));
        assert!(is_var_type("signed_long_integer"));
        assert!(is_builtin("makestring"));
        assert!(!is_builtin("frobnicate"));
    }
}
