//! End-to-end language tests: compile-and-run a whole program through
//! [`weave::Context`] and check its result, table-driven the way
//! `examples/scostello-monty`'s `tests/main.rs` generates one `#[test]`
//! per case from a macro over `(name, source, expected)` triples.

use weave::Context;

macro_rules! execute_int_tests {
    ($($name:ident: $code:literal => $expected:expr;)*) => {
        $(
            paste::item! {
                #[test]
                fn [< $name >]() {
                    let mut ctx = Context::new();
                    ctx.load($code).expect("compiles");
                    ctx.run(0, 1).expect("runs");
                    assert_eq!(ctx.get_int(0).expect("int result"), $expected);
                }
            }
        )*
    }
}

execute_int_tests! {
    while_loop_sums_to_ten: "local i = 0; local sum = 0; while (i < 5) { i = i + 1; sum = sum + i; } return sum;" => 15;
    do_while_runs_body_once_before_checking: "local i = 0; do { i = i + 1; } while (i < 0); return i;" => 1;
    for_loop_counts_down: "local total = 0; for (local i = 0; i < 4; i = i + 1) { total = total + i; } return total;" => 6;
    break_exits_innermost_loop: "local i = 0; while (i < 100) { if (i == 3) break; i = i + 1; } return i;" => 3;
    continue_skips_rest_of_body: "local i = 0; local sum = 0; while (i < 5) { i = i + 1; if (i % 2 == 0) continue; sum = sum + i; } return sum;" => 9;
    bitwise_and_or_xor: "return (6 & 3) + (6 | 1) + (6 ^ 5);" => 2 + 7 + 3;
    shift_left_and_right: "return (1 << 4) + (256 >> 4);" => 16 + 16;
    logical_and_short_circuits: "local calls = 0; local function sideEffect(){ calls = calls + 1; return 1; } local r = 0 && sideEffect(); return calls;" => 0;
    logical_or_short_circuits: "local calls = 0; local function sideEffect(){ calls = calls + 1; return 1; } local r = 1 || sideEffect(); return calls;" => 0;
    comparisons_greater_and_greater_eq: "local a = 0; if (5 > 3) a = a + 1; if (5 >= 5) a = a + 1; if (!(3 >= 5)) a = a + 1; return a;" => 3;
    unary_minus_and_not: "local a = -5; local b = !0; return a + b;" => -5 + 1;
    modulo_of_negative_dividend: "return -7 % 3;" => -7 % 3;
    integer_division_truncates: "return 7 / 2;" => 3;
    mixed_int_float_division_promotes: "local f = 7.0 / 2; if (f > 3) return 1; return 0;" => 1;
    nested_closures_capture_through_two_levels: "\
        local function outer() { \
            local x = 10; \
            local function middle() { \
                local function inner() { return x + 1; } \
                return inner(); \
            } \
            return middle(); \
        } \
        return outer();" => 11;
    global_variable_roundtrip: "g = 41; g = g + 1; return g;" => 42;
    recursive_fibonacci: "\
        local function fib(n) { if (n < 2) return n; return fib(n - 1) + fib(n - 2); } \
        return fib(10);" => 55;
    array_growth_via_assignment: "local a = array{}; a[3] = 9; return a[3];" => 9;
    table_missing_key_is_null_as_zero_truthiness: "local t = table{}; local v = t[\"missing\"]; if (v) return 1; return 0;" => 0;
    string_equality_by_content: "local a = \"hi\"; local b = \"h\" + \"i\"; if (a == b) return 1; return 0;" => 1;
    assignment_expression_yields_value: "local a = 0; local b = (a = 7); return a + b;" => 14;
    increment_and_decrement_operators: "local a = 5; a++; --a; a++; return a;" => 6;
    compound_assignment_evaluates_table_index_key_once: "\
        local calls = 0; \
        local function k(){ calls = calls + 1; return 1; } \
        local t = table{}; \
        t[1] = 10; \
        t[k()] += 5; \
        return calls;" => 1;
    increment_evaluates_table_index_key_once: "\
        local calls = 0; \
        local function k(){ calls = calls + 1; return 1; } \
        local t = table{}; \
        t[1] = 10; \
        t[k()]++; \
        return calls;" => 1;
    float_zero_is_falsy: "local f = 0.0; if (f) return 1; return 0;" => 0;
}

#[test]
fn division_by_zero_is_a_runtime_error() {
    let mut ctx = Context::new();
    ctx.load("return 1 / 0;").expect("compiles");
    let err = ctx.run(0, 1).expect_err("division by zero must fail");
    assert_eq!(err, weave::RuntimeError::DivisionByZero);
}

#[test]
fn assigning_to_a_non_lvalue_is_a_compile_error() {
    let mut ctx = Context::new();
    let err = ctx.load("1 = 2;").expect_err("not an l-value");
    assert!(matches!(err, weave::CompileError::Analysis(weave::AnalysisError::NotAnLValue { .. })));
}

#[test]
fn break_outside_a_loop_is_a_compile_error() {
    let mut ctx = Context::new();
    let err = ctx.load("break;").expect_err("break outside loop");
    assert!(matches!(err, weave::CompileError::Analysis(weave::AnalysisError::JumpOutsideLoop { .. })));
}

#[test]
fn native_function_can_read_and_push_through_the_buffer() {
    fn double(ctx: &mut Context) -> Result<(), weave::RuntimeError> {
        let n = ctx.get_int(0)?;
        ctx.clear();
        ctx.push_int(n * 2)?;
        Ok(())
    }

    let mut ctx = Context::new();
    ctx.register_cfunction("double", double);
    ctx.load("return double(21);").expect("compiles");
    ctx.run(0, 1).expect("runs");
    assert_eq!(ctx.get_int(0).expect("int result"), 42);
}

#[test]
fn unterminated_block_comment_reports_opening_line() {
    let mut ctx = Context::new();
    let err = ctx.load("local x = 1;\n/* oops\nreturn x;").expect_err("unterminated comment");
    assert!(matches!(
        err,
        weave::CompileError::Lex(weave::LexError::UnterminatedComment { line: 2 })
    ));
}
