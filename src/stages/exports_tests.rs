use super::*;
use crate::diagnostics::AnomalyKind;
use crate::discovery::ClosureKind;
use crate::options::{CompileOptions, OutputFormat};
use crate::stages::testing::Harness;
use pretty_assertions::assert_eq;

fn es() -> Harness {
    Harness::new(CompileOptions::new(OutputFormat::Es))
}

fn binding(local: &str, exported: &str, kind: ClosureKind) -> ExportBinding {
    ExportBinding {
        local_name: local.to_string(),
        exported_name: exported.to_string(),
        closure_kind: kind,
        range: SyntaxRange::new(0, 0),
        origin_module: None,
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PRE-PHASE
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_preserve_named_declarations() {
    let mut h = es();
    let pre = h
        .run(preserve, "export function foo(){ return 1; }\nexport class Bar {}\n")
        .unwrap();
    assert_eq!(
        pre,
        "function foo(){ return 1; }\nclass Bar {}\n\nwindow[\"foo\"] = foo;\nwindow[\"Bar\"] = Bar;"
    );
    assert_eq!(h.memory.exports.len(), 2);

    let stubs = externs(&h.extern_context()).unwrap();
    assert_eq!(stubs, "window.foo;\nwindow.Bar;\n");
}

#[test]
fn test_preserve_specifiers_and_defaults() {
    let mut h = es();
    let pre = h
        .run(preserve, "let a = 1;\nfunction f(){}\nexport { a, f as g };\nexport default f;\n")
        .unwrap();
    assert_eq!(
        pre,
        "let a = 1;\nfunction f(){}\n\nwindow[\"a\"] = a;\nwindow[\"g\"] = f;\nwindow[\"default\"] = f;"
    );
    assert_eq!(externs(&h.extern_context()).unwrap(), "window.a;\nwindow.g;\nwindow.default;\n");
}

#[test]
fn test_preserve_names_anonymous_default() {
    let mut h = es();
    let pre = h.run(preserve, "export default class { run() {} }").unwrap();
    let local = h.memory.exports.iter().next().unwrap().local_name.clone();
    assert_eq!(
        pre,
        format!("class {} {{ run() {{}} }}\nwindow[\"default\"] = {};", local, local)
    );
}

#[test]
fn test_preserve_quotes_string_export_names() {
    let mut h = es();
    let pre = h.run(preserve, "const a = 1;\nexport { a as \"it's\" };").unwrap();
    assert_eq!(pre, "const a = 1;\n\nwindow[\"it's\"] = a;");
    assert_eq!(externs(&h.extern_context()).unwrap(), "window[\"it's\"];\n");

    let mut h = es();
    let pre = h
        .run(preserve, "const b = 2;\nexport { b as \"say \\\"hi\\\"\" };")
        .unwrap();
    assert_eq!(pre, "const b = 2;\n\nwindow[\"say \\\"hi\\\"\"] = b;");
}

#[test]
fn test_preserve_inactive_for_non_module_formats() {
    let mut h = Harness::new(CompileOptions::new(OutputFormat::Cjs));
    let src = "export const a = 1;";
    assert_eq!(h.run(preserve, src).unwrap(), src);
    assert!(externs(&h.extern_context()).is_none());
}

#[test]
fn test_preserve_rejects_wildcard() {
    let mut h = es();
    let err = h.run(preserve, "export * from './x';").unwrap_err();
    assert!(matches!(err, PipelineError::UnsupportedSyntaxForm { .. }));
}

// ═══════════════════════════════════════════════════════════════════════════════
// POST-PHASE
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_restore_prefixes_surviving_declarations() {
    let mut h = es();
    h.memory.exports.record(binding("foo", "foo", ClosureKind::NamedFunction));
    h.memory.exports.record(binding("Bar", "Bar", ClosureKind::NamedClass));
    let out = h
        .run(
            restore,
            "function foo(){return 1}class Bar{}window.foo=foo;window.Bar=Bar;",
        )
        .unwrap();
    assert_eq!(out, "export function foo(){return 1}export class Bar{}");
    assert!(h.anomalies.is_empty());
}

#[test]
fn test_restore_class_through_alias() {
    let mut h = es();
    h.memory.exports.record(binding("Foo", "Foo", ClosureKind::NamedClass));
    let out = h
        .run(
            restore,
            "var a=class{constructor(b){this.n=b}};window.Foo=a;",
        )
        .unwrap();
    assert_eq!(out, "var a=class{constructor(b){this.n=b}};\nexport{a as Foo};");
}

#[test]
fn test_restore_renamed_function() {
    let mut h = es();
    h.memory.exports.record(binding("foo", "foo", ClosureKind::NamedFunction));
    let out = h.run(restore, "function b(){return 1}window.foo=b;").unwrap();
    assert_eq!(out, "function b(){return 1}\nexport{b as foo};");
}

#[test]
fn test_restore_inlined_function_expression() {
    let mut h = es();
    h.memory.exports.record(binding("foo", "foo", ClosureKind::NamedFunction));
    h.memory.exports.record(binding("Bar", "Bar", ClosureKind::NamedClass));
    let out = h
        .run(
            restore,
            "window.foo=async function(a){return a};\nwindow.Bar=class extends Base{};\n",
        )
        .unwrap();
    assert_eq!(
        out,
        "export async function foo(a){return a}\nexport class Bar extends Base{}\n"
    );
}

#[test]
fn test_restore_default_forms() {
    let mut h = es();
    h.memory.exports.record(binding("main", "default", ClosureKind::NamedDefaultFunction));
    let out = h.run(restore, "function main(){}window[\"default\"]=main;").unwrap();
    assert_eq!(out, "export default function main(){}");

    let mut h = es();
    h.memory.exports.record(binding("x", "default", ClosureKind::DefaultFunction));
    let out = h.run(restore, "window.default=function(){return 2};").unwrap();
    assert_eq!(out, "export default function(){return 2}");
}

#[test]
fn test_restore_anonymous_default_drops_given_name() {
    let mut h = es();
    h.memory
        .exports
        .record(binding("default_export_abc", "default", ClosureKind::DefaultClass));
    let out = h
        .run(restore, "class default_export_abc{run(){}}window.default=default_export_abc;")
        .unwrap();
    assert_eq!(out, "export default class{run(){}}");

    let mut h = es();
    h.memory
        .exports
        .record(binding("default_export_abc", "default", ClosureKind::DefaultFunction));
    let out = h
        .run(restore, "function default_export_abc(){return 1}window.default=default_export_abc;")
        .unwrap();
    assert_eq!(out, "export default function(){return 1}");
}

#[test]
fn test_restore_anonymous_default_keeps_referenced_name() {
    let mut h = es();
    h.memory
        .exports
        .record(binding("default_export_abc", "default", ClosureKind::DefaultFunction));
    let out = h
        .run(
            restore,
            "function default_export_abc(n){return n&&default_export_abc(n-1)}window.default=default_export_abc;",
        )
        .unwrap();
    assert_eq!(
        out,
        "export default function default_export_abc(n){return n&&default_export_abc(n-1)}"
    );
}

#[test]
fn test_restore_string_export_name() {
    let mut h = es();
    h.memory.exports.record(binding("a", "it's", ClosureKind::NamedConstant));
    let out = h.run(restore, "var a=1;window[\"it's\"]=a;").unwrap();
    assert_eq!(out, "var a=1;\nexport{a as \"it's\"};");
}

#[test]
fn test_restore_constants_share_one_aggregate() {
    let mut h = es();
    h.memory.exports.record(binding("a", "a", ClosureKind::NamedConstant));
    h.memory.exports.record(binding("b", "b", ClosureKind::NamedConstant));
    h.memory.exports.record(binding("c", "c", ClosureKind::NamedConstant));
    let out = h
        .run(restore, "var a=1;window.a=a;window.b=2;window.c=[a,1];\n")
        .unwrap();
    assert_eq!(
        out,
        "var a=1;const b = 2;const c = [a,1];\nexport{a,b,c};\n"
    );
}

#[test]
fn test_restore_constant_with_taken_name() {
    let mut h = es();
    h.memory.exports.record(binding("b", "b", ClosureKind::NamedConstant));
    let out = h.run(restore, "var b=function(){};window.b=1;").unwrap();
    let id = h.mangler.origin_id("entry.js");
    assert_eq!(
        out,
        format!("var b=function(){{}};const b_{id} = 1;\nexport{{b_{id} as b}};")
    );
}

#[test]
fn test_restore_inside_sequence() {
    let mut h = es();
    h.memory.exports.record(binding("foo", "foo", ClosureKind::NamedFunction));
    let out = h
        .run(restore, "function foo(){}init(),window.foo=foo;")
        .unwrap();
    assert_eq!(out, "export function foo(){}init();");
}

#[test]
fn test_restore_inside_sequence_keeps_order() {
    let mut h = es();
    h.memory.exports.record(binding("x", "x", ClosureKind::NamedConstant));
    let out = h.run(restore, "a(),window.x=b(),c();").unwrap();
    assert_eq!(out, "a();const x = b();c();\nexport{x};");
}

#[test]
fn test_restore_sequence_wraps_ambiguous_runs() {
    let mut h = es();
    h.memory.exports.record(binding("x", "x", ClosureKind::NamedConstant));
    let out = h
        .run(restore, "window.x=1,function(){go()}(),{a:1}.a;")
        .unwrap();
    assert_eq!(out, "const x = 1;(function(){go()}(),{a:1}.a);\nexport{x};");
}

#[test]
fn test_restore_sequence_of_exports_only() {
    let mut h = es();
    h.memory.exports.record(binding("a", "a", ClosureKind::NamedConstant));
    h.memory.exports.record(binding("f", "f", ClosureKind::NamedFunction));
    let out = h
        .run(restore, "var a=1;function f(){}window.a=a,window.f=f;")
        .unwrap();
    assert_eq!(out, "var a=1;export function f(){}\nexport{a};");
}

#[test]
fn test_restore_missing_assignment_is_anomaly() {
    let mut h = es();
    h.memory.exports.record(binding("foo", "foo", ClosureKind::NamedFunction));
    h.memory.exports.record(binding("bar", "bar", ClosureKind::NamedFunction));
    let out = h.run(restore, "function foo(){}window.foo=foo;").unwrap();
    assert_eq!(out, "export function foo(){}");
    assert_eq!(h.anomalies.len(), 1);
    assert_eq!(h.anomalies[0].kind, AnomalyKind::RestorationAnomaly);
    assert!(h.anomalies[0].message.contains("bar"));
}

#[test]
fn test_restore_unrelated_window_writes_are_kept() {
    let mut h = es();
    h.memory.exports.record(binding("foo", "foo", ClosureKind::NamedFunction));
    let out = h
        .run(restore, "window.other=1;function foo(){}window.foo=foo;")
        .unwrap();
    assert_eq!(out, "window.other=1;export function foo(){}");
}

#[test]
fn test_restore_imported_binding_reexport() {
    let mut h = es();
    h.memory.imports.mangled.push("chunk_abc123".to_string());
    h.memory.exports.record(binding("chunk", "chunk", ClosureKind::NamedConstant));
    let out = h.run(restore, "window.chunk=chunk_abc123;").unwrap();
    assert_eq!(out, "\nexport{chunk_abc123 as chunk};");
}
