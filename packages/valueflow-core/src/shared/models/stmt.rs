//! Language-neutral IR statements.
//!
//! The front ends (out of scope here) lower every supported language into
//! this statement vocabulary. One record per statement, flat operands,
//! control handled by header statements plus explicit CFG edges.

use serde::{Deserialize, Serialize};

/// Statement id; doubles as the declaration id of whatever the statement
/// declares. Negative values are reserved sentinels.
pub type StmtId = i64;

/// Method id (= the `method_decl` statement id).
pub type MethodId = i64;

/// Unit (translation unit / file) id.
pub type UnitId = i64;

/// Symbol identity: the declaring statement id, or a synthesized positive id
/// for names with no reachable declaration.
pub type SymbolId = i64;

/// State identity group: all versions of the same logical value share one.
pub type StateId = i64;

/// Scope id (= the statement id of the scope-introducing statement; 0 is the
/// unit's global scope).
pub type ScopeId = i64;

/// The global scope of a unit.
pub const GLOBAL_SCOPE_ID: ScopeId = 0;

/// A literal constant appearing as an operand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConstValue {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Null,
}

impl ConstValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ConstValue::Int(v) => Some(*v),
            _ => None,
        }
    }
}

/// A statement operand: a named reference or a literal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operand {
    Var(String),
    Const(ConstValue),
}

impl Operand {
    pub fn var(name: impl Into<String>) -> Self {
        Operand::Var(name.into())
    }

    pub fn int(v: i64) -> Self {
        Operand::Const(ConstValue::Int(v))
    }

    pub fn str(v: impl Into<String>) -> Self {
        Operand::Const(ConstValue::Str(v.into()))
    }

    pub fn as_var(&self) -> Option<&str> {
        match self {
            Operand::Var(name) => Some(name),
            _ => None,
        }
    }
}

/// One IR statement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stmt {
    pub stmt_id: StmtId,
    /// The scope-introducing statement this one sits in (method body, class
    /// body, block, or the unit's global scope).
    pub parent_stmt_id: ScopeId,
    pub kind: StmtKind,
}

impl Stmt {
    pub fn new(stmt_id: StmtId, parent_stmt_id: ScopeId, kind: StmtKind) -> Self {
        Self {
            stmt_id,
            parent_stmt_id,
            kind,
        }
    }

    /// Loop headers re-enter through back edges and get their reaching sets
    /// split between first and later rounds.
    pub fn is_loop_header(&self) -> bool {
        matches!(
            self.kind,
            StmtKind::While { .. }
                | StmtKind::DoWhile { .. }
                | StmtKind::For { .. }
                | StmtKind::ForIn { .. }
        )
    }

    pub fn is_return(&self) -> bool {
        matches!(self.kind, StmtKind::Return { .. } | StmtKind::Yield { .. })
    }
}

/// The closed set of IR statement kinds.
///
/// Every kind gets a def/use arm and a state-transfer arm; adding a variant
/// without handling it is a compile error downstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StmtKind {
    /// `target = operand` or `target = operand <op> operand2`
    Assign {
        target: String,
        operator: Option<String>,
        operand: Operand,
        operand2: Option<Operand>,
    },
    /// `target = name(args...)`
    Call {
        target: String,
        name: String,
        positional_args: Vec<Operand>,
        named_args: Vec<(String, Operand)>,
        packed_positional_arg: Option<String>,
        packed_named_arg: Option<String>,
    },
    Return {
        value: Option<Operand>,
    },
    Yield {
        value: Option<Operand>,
    },
    Throw {
        value: Option<Operand>,
    },

    // Control headers; branching structure lives in the CFG.
    If {
        condition: Operand,
    },
    While {
        condition: Operand,
    },
    DoWhile {
        condition: Operand,
    },
    For {
        condition: Operand,
    },
    ForIn {
        target: String,
        receiver: Operand,
    },
    Switch {
        condition: Operand,
    },
    Case {
        condition: Operand,
    },
    Break,
    Continue,
    Goto,
    Block,
    Try,
    Catch {
        exception: Option<String>,
    },

    // Declarations.
    VariableDecl {
        name: String,
        data_type: String,
    },
    ParameterDecl {
        name: String,
        data_type: String,
        default_value: Option<Operand>,
        packed_positional: bool,
        packed_named: bool,
    },
    MethodDecl {
        name: String,
    },
    ClassDecl {
        name: String,
    },

    // Imports/exports; resolved through the unit's import/export graph.
    Import {
        name: String,
        alias: Option<String>,
    },
    FromImport {
        source: String,
        name: String,
        alias: Option<String>,
    },
    Export {
        name: String,
    },

    // Composite construction.
    NewObject {
        target: String,
        class_name: Option<String>,
    },
    NewArray {
        target: String,
    },
    NewRecord {
        target: String,
    },

    // Field and array access.
    FieldRead {
        target: String,
        receiver: String,
        field: String,
    },
    FieldWrite {
        receiver: String,
        field: String,
        source: Operand,
    },
    ArrayRead {
        target: String,
        receiver: String,
        index: Operand,
    },
    ArrayWrite {
        receiver: String,
        index: Operand,
        source: Operand,
    },
    ArrayAppend {
        receiver: String,
        source: Operand,
    },

    /// Comments, pass statements, and anything with no def/use effect.
    Nop,
}

impl StmtKind {
    /// Short operation name for logs and diagnostics.
    pub fn operation(&self) -> &'static str {
        match self {
            StmtKind::Assign { .. } => "assign",
            StmtKind::Call { .. } => "call",
            StmtKind::Return { .. } => "return",
            StmtKind::Yield { .. } => "yield",
            StmtKind::Throw { .. } => "throw",
            StmtKind::If { .. } => "if",
            StmtKind::While { .. } => "while",
            StmtKind::DoWhile { .. } => "dowhile",
            StmtKind::For { .. } => "for",
            StmtKind::ForIn { .. } => "forin",
            StmtKind::Switch { .. } => "switch",
            StmtKind::Case { .. } => "case",
            StmtKind::Break => "break",
            StmtKind::Continue => "continue",
            StmtKind::Goto => "goto",
            StmtKind::Block => "block",
            StmtKind::Try => "try",
            StmtKind::Catch { .. } => "catch",
            StmtKind::VariableDecl { .. } => "variable_decl",
            StmtKind::ParameterDecl { .. } => "parameter_decl",
            StmtKind::MethodDecl { .. } => "method_decl",
            StmtKind::ClassDecl { .. } => "class_decl",
            StmtKind::Import { .. } => "import",
            StmtKind::FromImport { .. } => "from_import",
            StmtKind::Export { .. } => "export",
            StmtKind::NewObject { .. } => "new_object",
            StmtKind::NewArray { .. } => "new_array",
            StmtKind::NewRecord { .. } => "new_record",
            StmtKind::FieldRead { .. } => "field_read",
            StmtKind::FieldWrite { .. } => "field_write",
            StmtKind::ArrayRead { .. } => "array_read",
            StmtKind::ArrayWrite { .. } => "array_write",
            StmtKind::ArrayAppend { .. } => "array_append",
            StmtKind::Nop => "nop",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loop_header_detection() {
        let header = Stmt::new(
            1,
            0,
            StmtKind::While {
                condition: Operand::var("c"),
            },
        );
        assert!(header.is_loop_header());

        let plain = Stmt::new(
            2,
            0,
            StmtKind::Assign {
                target: "a".into(),
                operator: None,
                operand: Operand::int(1),
                operand2: None,
            },
        );
        assert!(!plain.is_loop_header());
    }

    #[test]
    fn test_operand_accessors() {
        assert_eq!(Operand::var("x").as_var(), Some("x"));
        assert_eq!(Operand::int(3).as_var(), None);
        assert_eq!(ConstValue::Int(7).as_int(), Some(7));
    }
}
