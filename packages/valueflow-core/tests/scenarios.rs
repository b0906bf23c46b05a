//! End-to-end scenarios over the full pipeline: def/use analysis, the
//! intraprocedural summary phase, and the interprocedural composition phase,
//! all driven through the in-memory program database.

use pretty_assertions::assert_eq;

use valueflow_core::config::{DYNAMIC_METHOD_ID, RETURN_SYMBOL_ID};
use valueflow_core::features::resolver::Resolver;
use valueflow_core::features::state_space::{StateKind, StateValue, SymbolStateSpace};
use valueflow_core::features::summary::MethodSummaryTemplate;
use valueflow_core::shared::models::{ConstValue, MethodId, Operand, StmtKind};
use valueflow_core::{AnalysisSession, MemoryProgramDb, ProgramBuilder, ProgramDb};

fn call(target: &str, name: &str, positional_args: Vec<Operand>) -> StmtKind {
    StmtKind::Call {
        target: target.into(),
        name: name.into(),
        positional_args,
        named_args: vec![],
        packed_positional_arg: None,
        packed_named_arg: None,
    }
}

/// `f(p) { p.x = 1; return p; }`
fn build_field_write_method(builder: &mut ProgramBuilder, unit: i64) -> MethodId {
    let f = builder.begin_method(unit, "f", &["p"]);
    builder.stmt(StmtKind::FieldWrite {
        receiver: "p".into(),
        field: "x".into(),
        source: Operand::int(1),
    });
    builder.stmt(StmtKind::Return {
        value: Some(Operand::var("p")),
    });
    builder.end_method();
    f
}

fn has_field_const(space: &SymbolStateSpace, index: usize, field: &str, expected: i64) -> bool {
    let Some(state) = space.state(index) else {
        return false;
    };
    let Some(children) = state.fields.get(field) else {
        return false;
    };
    children.iter().any(|&child| {
        matches!(
            space.state(child).map(|s| &s.value),
            Some(StateValue::Const(ConstValue::Int(v))) if *v == expected
        )
    })
}

#[test]
fn test_parameter_field_write_flows_into_summary() {
    let mut builder = ProgramBuilder::new();
    let unit = builder.add_unit("main");
    let f = build_field_write_method(&mut builder, unit);
    builder.add_entry_point(f);
    let db = builder.build();

    let mut session = AnalysisSession::new(&db);
    session.run().unwrap();

    let template = session.store.summary_template(f).expect("summary for f");
    let space = session.store.template_space(f).expect("space for f");
    let p_id = db.method_parameters(f)[0].symbol_id;

    let param_entries = &template.parameter_symbols[&p_id];
    assert_eq!(param_entries.len(), 1);
    let param_index = param_entries.iter().next().unwrap().new_index.unwrap();
    assert!(has_field_const(space, param_index, "x", 1));

    // the returned value aliases the parameter's final state
    let return_indexes: Vec<usize> = template.return_symbols[&RETURN_SYMBOL_ID]
        .iter()
        .map(|e| e.new_index.unwrap())
        .collect();
    assert_eq!(return_indexes, vec![param_index]);
}

#[test]
fn test_callee_summary_splices_into_caller() {
    let mut builder = ProgramBuilder::new();
    let unit = builder.add_unit("main");
    let f = build_field_write_method(&mut builder, unit);

    // g() { obj = {}; r = f(obj); return obj; }
    let g = builder.begin_method(unit, "g", &[]);
    builder.stmt(StmtKind::NewRecord {
        target: "obj".into(),
    });
    let call_stmt = builder.stmt(call("r", "f", vec![Operand::var("obj")]));
    builder.stmt(StmtKind::Return {
        value: Some(Operand::var("obj")),
    });
    builder.end_method();
    builder.add_entry_point(g);
    let db = builder.build();

    let mut session = AnalysisSession::new(&db);
    session.run().unwrap();

    assert!(session.store.call_graph.has_call_site(g, f, call_stmt));

    // alias write-through: obj gained x -> 1 from f's summary
    let template = session.store.summary_template(g).expect("summary for g");
    let space = session.store.template_space(g).expect("space for g");
    let return_entries = &template.return_symbols[&RETURN_SYMBOL_ID];
    assert!(!return_entries.is_empty());
    assert!(return_entries
        .iter()
        .any(|e| has_field_const(space, e.new_index.unwrap(), "x", 1)));

    // the splice redefined the argument symbol at the call site
    let artifacts = session.store.summary_phase(g).unwrap();
    assert!(!artifacts.statuses[&call_stmt]
        .implicitly_defined_symbols
        .is_empty());

    // the interprocedural phase produced a call-site instance and recorded
    // the maximal concrete path
    assert!(session.store.summary_instance((g, call_stmt, f)).is_some());
    let paths: Vec<&[i64]> = session
        .store
        .call_paths
        .iter()
        .map(|p| p.elements())
        .collect();
    assert_eq!(paths, vec![&[g, call_stmt, f][..]]);
}

#[test]
fn test_mutual_recursion_terminates_with_finite_summaries() {
    let mut builder = ProgramBuilder::new();
    let unit = builder.add_unit("main");

    let a = builder.begin_method(unit, "a", &[]);
    builder.stmt(call("x", "b", vec![]));
    builder.stmt(StmtKind::Return {
        value: Some(Operand::var("x")),
    });
    builder.end_method();

    let b = builder.begin_method(unit, "b", &[]);
    builder.stmt(call("y", "a", vec![]));
    builder.stmt(StmtKind::Return {
        value: Some(Operand::var("y")),
    });
    builder.end_method();

    builder.add_entry_point(a);
    let db = builder.build();

    let mut session = AnalysisSession::new(&db);
    session.run().unwrap();

    for method in [a, b] {
        let template = session
            .store
            .summary_template(method)
            .expect("recursive method summarized");
        assert!(!template.return_symbols.is_empty());
    }
    // the cycle completed with a placeholder, not an unbounded expansion
    let b_template = session.store.summary_template(b).unwrap();
    let b_space = session.store.template_space(b).unwrap();
    let b_return = b_template.return_symbols[&RETURN_SYMBOL_ID]
        .iter()
        .next()
        .unwrap();
    assert_eq!(
        b_space.state(b_return.new_index.unwrap()).unwrap().kind,
        StateKind::Anything
    );

    assert!(session.store.call_graph.has_edge(a, b));
    assert!(session.store.call_graph.has_edge(b, a));
}

#[test]
fn test_straight_line_redefinitions_keep_only_the_last() {
    let mut builder = ProgramBuilder::new();
    let unit = builder.add_unit("main");
    let f = builder.begin_method(unit, "f", &[]);
    for v in 1..=3 {
        builder.stmt(StmtKind::Assign {
            target: "a".into(),
            operator: None,
            operand: Operand::int(v),
            operand2: None,
        });
    }
    builder.stmt(StmtKind::Return {
        value: Some(Operand::var("a")),
    });
    builder.end_method();
    builder.add_entry_point(f);
    let db = builder.build();

    let mut session = AnalysisSession::new(&db);
    session.run().unwrap();

    let template = session.store.summary_template(f).unwrap();
    let space = session.store.template_space(f).unwrap();
    let return_entries = &template.return_symbols[&RETURN_SYMBOL_ID];
    assert_eq!(return_entries.len(), 1);
    let state = space
        .state(return_entries.iter().next().unwrap().new_index.unwrap())
        .unwrap();
    assert_eq!(state.value, StateValue::Const(ConstValue::Int(3)));
}

#[test]
fn test_loop_converges_within_round_caps() {
    let mut builder = ProgramBuilder::new();
    let unit = builder.add_unit("main");
    let f = builder.begin_method(unit, "f", &[]);
    builder.stmt(StmtKind::Assign {
        target: "i".into(),
        operator: None,
        operand: Operand::int(0),
        operand2: None,
    });
    builder.begin_while(Operand::var("c"));
    builder.stmt(StmtKind::Assign {
        target: "i".into(),
        operator: Some("+".into()),
        operand: Operand::var("i"),
        operand2: Some(Operand::int(1)),
    });
    builder.end_loop();
    builder.stmt(StmtKind::Return {
        value: Some(Operand::var("i")),
    });
    builder.end_method();
    builder.add_entry_point(f);
    let db = builder.build();

    let mut session = AnalysisSession::new(&db);
    // must reach the bounded fixed point instead of iterating forever
    session.run().unwrap();

    let template = session.store.summary_template(f).unwrap();
    assert!(!template.return_symbols.is_empty());
}

#[test]
fn test_unresolved_callee_degrades_to_anything() {
    let mut builder = ProgramBuilder::new();
    let unit = builder.add_unit("main");
    let f = builder.begin_method(unit, "f", &[]);
    let call_stmt = builder.stmt(call("u", "mystery", vec![]));
    builder.stmt(StmtKind::Return {
        value: Some(Operand::var("u")),
    });
    builder.end_method();
    builder.add_entry_point(f);
    let db = builder.build();

    let mut session = AnalysisSession::new(&db);
    session.run().unwrap();

    assert!(session.store.call_graph.has_edge(f, DYNAMIC_METHOD_ID));

    let template = session.store.summary_template(f).unwrap();
    let space = session.store.template_space(f).unwrap();
    assert!(template.dynamic_call_stmts.contains(&call_stmt));
    let return_entries = &template.return_symbols[&RETURN_SYMBOL_ID];
    assert!(!return_entries.is_empty());
    for entry in return_entries {
        let state = space.state(entry.new_index.unwrap()).unwrap();
        assert_eq!(state.kind, StateKind::Anything);
    }
}

fn summarize(db: &MemoryProgramDb) -> AnalysisSession<'_> {
    let mut session = AnalysisSession::new(db);
    session.run_def_use().unwrap();
    session.run_summary_phase().unwrap();
    session
}

#[test]
fn test_summary_generation_is_idempotent() {
    let mut builder = ProgramBuilder::new();
    let unit = builder.add_unit("main");
    let f = build_field_write_method(&mut builder, unit);
    let db = builder.build();

    let first = summarize(&db);
    let second = summarize(&db);

    let t1 = first.store.summary_template(f).unwrap();
    let t2 = second.store.summary_template(f).unwrap();
    let sp1 = first.store.template_space(f).unwrap();
    let sp2 = second.store.template_space(f).unwrap();

    for (record1, record2) in [
        (&t1.parameter_symbols, &t2.parameter_symbols),
        (&t1.return_symbols, &t2.return_symbols),
    ] {
        assert_eq!(record1.len(), record2.len());
        for (symbol_id, entries1) in record1 {
            let entries2 = &record2[symbol_id];
            assert_eq!(entries1.len(), entries2.len());
            for entry1 in entries1 {
                let index1 = entry1.new_index.unwrap();
                assert!(entries2.iter().any(|entry2| {
                    Resolver::are_states_identical(sp1, index1, sp2, entry2.new_index.unwrap())
                }));
            }
        }
    }
}

#[test]
fn test_summary_template_survives_json_round_trip() {
    let mut builder = ProgramBuilder::new();
    let unit = builder.add_unit("main");
    let f = build_field_write_method(&mut builder, unit);
    let db = builder.build();
    let session = summarize(&db);

    let template = session.store.summary_template(f).unwrap();
    let json = serde_json::to_string(template).unwrap();
    let reloaded: MethodSummaryTemplate = serde_json::from_str(&json).unwrap();

    assert_eq!(reloaded.method_id, template.method_id);
    assert_eq!(
        reloaded.parameter_symbols.len(),
        template.parameter_symbols.len()
    );
    assert_eq!(
        reloaded.return_symbols[&RETURN_SYMBOL_ID],
        template.return_symbols[&RETURN_SYMBOL_ID]
    );
}
