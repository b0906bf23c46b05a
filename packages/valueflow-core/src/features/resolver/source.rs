//! Symbol-name → declaration resolution.

use crate::config::BUILTIN_THIS_SYMBOL_ID;
use crate::features::def_use::THIS_NAME;
use crate::features::loader::ProgramDb;
use crate::shared::models::{ScopeId, SourceSymbolInfo, Stmt, UnitId, GLOBAL_SCOPE_ID};

/// Walk the unit's scope hierarchy (nearest enclosing first, then the
/// globally visible scopes) to find where `name` is declared; follow the
/// import/export graph when the declaration is itself an import. Returns the
/// declaration together with the scope it was found in, or `None` when the
/// name has no reachable declaration.
pub fn resolve_symbol_source_with_scope(
    db: &dyn ProgramDb,
    unit_id: UnitId,
    stmt: &Stmt,
    name: &str,
    must_be_global: bool,
) -> Option<(SourceSymbolInfo, ScopeId)> {
    if name == THIS_NAME {
        return Some((
            SourceSymbolInfo::new(unit_id, BUILTIN_THIS_SYMBOL_ID),
            stmt.parent_stmt_id,
        ));
    }

    let summary = db.unit_symbol_decl_summary(unit_id)?;
    let declaring_scopes = summary.symbol_name_to_scope_ids.get(name)?;

    let target_scope = if must_be_global {
        if declaring_scopes.contains(&GLOBAL_SCOPE_ID) {
            GLOBAL_SCOPE_ID
        } else {
            return None;
        }
    } else {
        let scope = stmt.parent_stmt_id;
        let available = summary.scope_id_to_available_scope_ids.get(&scope)?;
        // the innermost declaring scope wins
        *available.intersection(declaring_scopes).max()?
    };

    let decl_stmt_id = *summary
        .scope_id_to_symbol_info
        .get(&target_scope)?
        .get(name)?;

    if db.is_import_stmt(decl_stmt_id) {
        if let Some(real) = db.resolve_import(unit_id, name) {
            return Some((real, target_scope));
        }
    }
    Some((SourceSymbolInfo::new(unit_id, decl_stmt_id), target_scope))
}

/// Like [`resolve_symbol_source_with_scope`] but never fails: an unresolved
/// name yields the sentinel pair (current unit, this statement's id), which
/// the def/use pass then replaces with a stable synthetic id.
pub fn resolve_symbol_source(
    db: &dyn ProgramDb,
    unit_id: UnitId,
    stmt: &Stmt,
    name: &str,
    must_be_global: bool,
) -> SourceSymbolInfo {
    resolve_symbol_source_with_scope(db, unit_id, stmt, name, must_be_global)
        .map(|(info, _)| info)
        .unwrap_or_else(|| SourceSymbolInfo::new(unit_id, stmt.stmt_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::loader::ProgramBuilder;
    use crate::shared::models::{Operand, StmtKind};

    #[test]
    fn test_local_beats_global() {
        let mut builder = ProgramBuilder::new();
        let unit = builder.add_unit("main");
        // a global method named "x" and a method-local "x"
        builder.begin_method(unit, "x", &[]);
        builder.stmt(StmtKind::Return { value: None });
        builder.end_method();
        let f = builder.begin_method(unit, "f", &[]);
        let local_decl = builder.stmt(StmtKind::Assign {
            target: "x".into(),
            operator: None,
            operand: Operand::int(1),
            operand2: None,
        });
        builder.stmt(StmtKind::Return {
            value: Some(Operand::var("x")),
        });
        builder.end_method();
        let db = builder.build();

        let probe = Stmt::new(9999, f, StmtKind::Nop);
        let (info, scope) =
            resolve_symbol_source_with_scope(&db, unit, &probe, "x", false).unwrap();
        assert_eq!(info.symbol_id, local_decl);
        assert_eq!(scope, f);

        // forced-global resolution sees the method declaration instead
        let (global_info, _) =
            resolve_symbol_source_with_scope(&db, unit, &probe, "x", true).unwrap();
        assert_ne!(global_info.symbol_id, local_decl);
    }

    #[test]
    fn test_unresolved_name_falls_back_to_sentinel() {
        let mut builder = ProgramBuilder::new();
        let unit = builder.add_unit("main");
        let f = builder.begin_method(unit, "f", &[]);
        builder.stmt(StmtKind::Return { value: None });
        builder.end_method();
        let db = builder.build();

        let probe = Stmt::new(424242, f, StmtKind::Nop);
        assert!(resolve_symbol_source_with_scope(&db, unit, &probe, "nope", false).is_none());
        let info = resolve_symbol_source(&db, unit, &probe, "nope", false);
        assert_eq!(info.symbol_id, 424242);
    }
}
