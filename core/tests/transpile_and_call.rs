/*
 * Copyright (c) 2026 Mohamad Al-Zawahreh (dba Sovereign Systems).
 *
 * This file is part of the WASM Transpiler.
 *
 * LICENSE: DUAL-LICENSED (AGPLv3 or COMMERCIAL).
 *
 * 1. OPEN SOURCE: You may use this file under the terms of the GNU Affero
 * General Public License v3.0. If you link to this code, your ENTIRE
 * application must be open-sourced under AGPLv3.
 *
 * 2. COMMERCIAL: For proprietary use, you must obtain a Commercial License
 * from Sovereign Systems.
 *
 * PATENT NOTICE: Protected by US Patent App #63/935,467.
 * NO IMPLIED LICENSE to rights of Mohamad Al-Zawahreh or Sovereign Systems.
 */

//! End-to-end: source text through the transpiler, called with host values.

use wasm_transpiler::{CompiledModule, MarshalError, Transpiler, Value};

const PROGRAMS: &str = r#"
function gcd(a, b) {
    while (b != 0) {
        var t = b;
        b = a % b;
        a = t;
    }
    return a;
}

function fibonacciWhile(n) {
    var a = 0;
    var b = 1;
    var i = 0;
    while (i < n) {
        var t = a + b;
        a = b;
        b = t;
        i++;
    }
    return a;
}

function loop(n, acc) {
    var i = 0;
    while (i < n) {
        acc++;
        i++;
    }
    return acc;
}

function nestedLoop(n, acc) {
    var i = 0;
    while (i < n) {
        var j = 0;
        while (j < n) {
            acc += 1;
            j++;
        }
        i++;
    }
    return acc;
}

function sequentialLoops(n) {
    var total = 0;
    for (var i = 0; i < n; i++) total += 2;
    for (var k = n; k > 0; k--) total -= 1;
    return total;
}

function isPrimeWhile(n): boolean {
    if (n < 2) return false;
    var d = 2;
    while (d * d <= n) {
        if (n % d == 0) return false;
        d++;
    }
    return true;
}

function countPrimes(limit) {
    var count = 0;
    for (var i = 0; i < limit; i++) {
        if (isPrimeWhile(i)) count++;
    }
    return count;
}

function notBoolean(n): boolean {
    return n;
}
"#;

const ARRAYS: &str = r#"
function at(arr, i) {
    return arr[i];
}

function len(arr) {
    return arr.length;
}

function setFirst(arr) {
    arr[0] = 42;
    return arr[0];
}

function addToFirst(arr) {
    arr[0] += 42;
    return arr[0];
}

function fill(arr, v) {
    for (var i = 0; i < arr.length; i++) {
        arr[i] = v;
    }
    return arr.length;
}

function sumArrayWhile(arr) {
    var s = 0;
    var i = 0;
    while (i < arr.length) {
        s += arr[i];
        i++;
    }
    return s;
}

function dot(xs: double[], ys: double[], start: double): double {
    var s = start;
    for (var i = 0; i < xs.length; i++) {
        s = s + xs[i] * ys[i];
    }
    return s;
}

function scale(xs: double[], k: double) {
    for (var i = 0; i < xs.length; i++) {
        xs[i] *= k;
    }
    return xs.length;
}

function bump(arr) {
    arr[1] += 1;
    return 1;
}

function eagerAnd(arr): boolean {
    return arr[0] > 100 && bump(arr);
}

function eagerOr(arr): boolean {
    return arr[0] < 100 || bump(arr);
}
"#;

fn compile(source: &str) -> (Transpiler, CompiledModule) {
    let transpiler = Transpiler::new();
    let module = transpiler
        .transpile(source)
        .unwrap_or_else(|e| panic!("Compilation failed: {}", e));
    (transpiler, module)
}

fn call(module: &CompiledModule, name: &str, args: &mut [Value]) -> Result<Value, MarshalError> {
    let mut wrapper = wasm_transpiler::CallWrapper::new(module);
    wrapper.set_function_name(name);
    wrapper.call(args)
}

fn call_with_outputs(
    module: &CompiledModule,
    name: &str,
    outputs: &[usize],
    args: &mut [Value],
) -> Result<Value, MarshalError> {
    let mut wrapper = wasm_transpiler::CallWrapper::new(module);
    wrapper.set_function_name(name).set_out_parameters(outputs);
    wrapper.call(args)
}

// =============================================================================
// Scalar programs
// =============================================================================

#[test]
fn test_gcd() {
    let (_, module) = compile(PROGRAMS);
    assert!(!module.imports_memory(), "scalar-only unit must not import memory");
    let result = call(&module, "gcd", &mut [Value::Int32(978), Value::Int32(2147483646)]);
    assert_eq!(result, Ok(Value::Int32(6)));
}

#[test]
fn test_fibonacci_while() {
    let (_, module) = compile(PROGRAMS);
    assert_eq!(
        call(&module, "fibonacciWhile", &mut [Value::Int32(41)]),
        Ok(Value::Int32(165580141))
    );
    // 2^32 wrapping past fib(46)
    assert_eq!(
        call(&module, "fibonacciWhile", &mut [Value::Int32(47)]),
        Ok(Value::Int32(2971215073u32 as i32))
    );
}

#[test]
fn test_while_loops() {
    let (_, module) = compile(PROGRAMS);
    assert_eq!(call(&module, "loop", &mut [Value::Int32(10), Value::Int32(5)]), Ok(Value::Int32(15)));
    assert_eq!(
        call(&module, "nestedLoop", &mut [Value::Int32(5), Value::Int32(10)]),
        Ok(Value::Int32(35))
    );
    assert_eq!(call(&module, "sequentialLoops", &mut [Value::Int32(7)]), Ok(Value::Int32(7)));
}

#[test]
fn test_zero_iteration_loops_return_initial_accumulator() {
    let (_, module) = compile(PROGRAMS);
    assert_eq!(call(&module, "loop", &mut [Value::Int32(0), Value::Int32(5)]), Ok(Value::Int32(5)));
    assert_eq!(
        call(&module, "nestedLoop", &mut [Value::Int32(0), Value::Int32(9)]),
        Ok(Value::Int32(9))
    );
    assert_eq!(call(&module, "sequentialLoops", &mut [Value::Int32(0)]), Ok(Value::Int32(0)));
}

#[test]
fn test_boolean_results() {
    let (_, module) = compile(PROGRAMS);
    assert_eq!(
        call(&module, "isPrimeWhile", &mut [Value::Int32(46327)]),
        Ok(Value::Boolean(true))
    );
    assert_eq!(
        call(&module, "isPrimeWhile", &mut [Value::Int32(46329)]),
        Ok(Value::Boolean(false))
    );
    assert_eq!(call(&module, "countPrimes", &mut [Value::Int32(100)]), Ok(Value::Int32(25)));
}

#[test]
fn test_raw_boolean_must_be_zero_or_one() {
    let (_, module) = compile(PROGRAMS);
    assert_eq!(call(&module, "notBoolean", &mut [Value::Int32(1)]), Ok(Value::Boolean(true)));
    let err = call(&module, "notBoolean", &mut [Value::Int32(5)]).unwrap_err();
    assert_eq!(err, MarshalError::BooleanConversion(5));
    insta::assert_snapshot!(err.to_string(), @"cannot convert 5 to boolean");
}

#[test]
fn test_float_arguments_are_converted_to_int() {
    let (_, module) = compile(PROGRAMS);
    assert_eq!(
        call(&module, "loop", &mut [Value::Float64(3.9), Value::Int32(0)]),
        Ok(Value::Int32(3))
    );
}

// =============================================================================
// Arrays
// =============================================================================

#[test]
fn test_length() {
    let (_, module) = compile(ARRAYS);
    assert!(module.imports_memory());
    for items in [vec![], vec![1], vec![0, 1, 2]] {
        let expected = items.len() as i32;
        assert_eq!(
            call(&module, "len", &mut [Value::Int32Array(items)]),
            Ok(Value::Int32(expected))
        );
    }
}

#[test]
fn test_subscript_out_of_range() {
    let (_, module) = compile(ARRAYS);
    // Index -1 is the length header
    assert_eq!(
        call(&module, "at", &mut [Value::Int32Array(vec![1, 2, 4, 8]), Value::Int32(-1)]),
        Ok(Value::Int32(4))
    );
    // Past the end but inside the page reads zeroed memory
    assert_eq!(
        call(&module, "at", &mut [Value::Int32Array(vec![1, 2]), Value::Int32(2)]),
        Ok(Value::Int32(0))
    );
    // Before the start of memory traps
    let err = call(&module, "at", &mut [Value::Int32Array(vec![1, 2]), Value::Int32(-2)]).unwrap_err();
    assert!(matches!(err, MarshalError::Execution(_)), "Expected trap, got {:?}", err);
}

#[test]
fn test_write_then_read() {
    let (_, module) = compile(ARRAYS);
    assert_eq!(
        call(&module, "setFirst", &mut [Value::Int32Array(vec![0, 1, 2])]),
        Ok(Value::Int32(42))
    );
    assert_eq!(
        call(&module, "addToFirst", &mut [Value::Int32Array(vec![5, 6, 7])]),
        Ok(Value::Int32(47))
    );
}

#[test]
fn test_inputs_untouched_unless_marked_as_output() {
    let (_, module) = compile(ARRAYS);

    let mut args = [Value::Int32Array(vec![0, 1, 2])];
    call(&module, "setFirst", &mut args).unwrap();
    assert_eq!(args[0], Value::Int32Array(vec![0, 1, 2]));

    let mut args = [Value::Int32Array(vec![0, 1, 2])];
    call_with_outputs(&module, "setFirst", &[0], &mut args).unwrap();
    assert_eq!(args[0], Value::Int32Array(vec![42, 1, 2]));

    let mut args = [Value::Int32Array(vec![9; 5]), Value::Int32(-3)];
    assert_eq!(call_with_outputs(&module, "fill", &[0], &mut args), Ok(Value::Int32(5)));
    assert_eq!(args[0], Value::Int32Array(vec![-3; 5]));
}

#[test]
fn test_large_array_sum() {
    let (_, module) = compile(ARRAYS);
    let items: Vec<i32> = (0..65535).collect();
    assert_eq!(
        call(&module, "sumArrayWhile", &mut [Value::Int32Array(items)]),
        Ok(Value::Int32(2147385345))
    );
}

#[test]
fn test_float_arrays() {
    let (_, module) = compile(ARRAYS);
    let result = call(
        &module,
        "dot",
        &mut [
            Value::Float64Array(vec![1.5, 2.0, -1.0]),
            Value::Float64Array(vec![2.0, 0.25, 4.0]),
            Value::Float64(0.5),
        ],
    );
    assert_eq!(result, Ok(Value::Float64(0.0)));

    let mut args = [Value::Float64Array(vec![1.0, 2.5]), Value::Float64(2.0)];
    assert_eq!(call_with_outputs(&module, "scale", &[0], &mut args), Ok(Value::Int32(2)));
    assert_eq!(args[0], Value::Float64Array(vec![2.0, 5.0]));
}

#[test]
fn test_mixed_int_and_float_arrays() {
    let (_, module) = compile(
        "function mix(a, xs: double[]): double { return a[0] + xs[0] + a.length + xs.length; }",
    );
    let result = call(
        &module,
        "mix",
        &mut [Value::Int32Array(vec![3]), Value::Float64Array(vec![0.5, 0.25])],
    );
    assert_eq!(result, Ok(Value::Float64(6.5)));
}

#[test]
fn test_logical_operators_evaluate_both_sides() {
    let (_, module) = compile(ARRAYS);

    let mut args = [Value::Int32Array(vec![1, 5])];
    assert_eq!(
        call_with_outputs(&module, "eagerAnd", &[0], &mut args),
        Ok(Value::Boolean(false))
    );
    assert_eq!(args[0], Value::Int32Array(vec![1, 6]), "right side of && must still run");

    let mut args = [Value::Int32Array(vec![1, 5])];
    assert_eq!(
        call_with_outputs(&module, "eagerOr", &[0], &mut args),
        Ok(Value::Boolean(true))
    );
    assert_eq!(args[0], Value::Int32Array(vec![1, 6]), "right side of || must still run");
}

#[test]
fn test_member_access_on_scalar_fails_compilation() {
    use wasm_transpiler::{CompileError, TranspileError, ValueType};

    let transpiler = Transpiler::new();
    for source in [
        "function f(n: int) { return n.length; }",
        "function f(n: int) { return n[0]; }",
        "function f(n: int) { n[0] = 3; return n; }",
    ] {
        let err = transpiler.transpile(source).unwrap_err();
        assert!(
            matches!(
                err,
                TranspileError::Compile(CompileError::NotAnArray { found: ValueType::Int32, .. })
            ),
            "{}: got {:?}",
            source,
            err
        );
    }
}

// =============================================================================
// Marshalling errors
// =============================================================================

#[test]
fn test_call_configuration_errors() {
    let (_, module) = compile(ARRAYS);

    let wrapper = wasm_transpiler::CallWrapper::new(&module);
    assert_eq!(wrapper.call(&mut []), Err(MarshalError::MissingFunctionName));

    assert_eq!(
        call(&module, "missing", &mut []),
        Err(MarshalError::UnknownFunction("missing".to_string()))
    );

    let err = call(&module, "len", &mut []).unwrap_err();
    insta::assert_snapshot!(err.to_string(), @"function `len` takes 1 arguments but 0 were given");

    let err = call(&module, "len", &mut [Value::Int32(3)]).unwrap_err();
    insta::assert_snapshot!(err.to_string(), @"argument 0 should be int[] but was int");
}

#[test]
fn test_output_parameter_errors() {
    let (_, module) = compile(ARRAYS);
    let mut args = [Value::Int32Array(vec![1]), Value::Int32(2)];
    assert_eq!(
        call_with_outputs(&module, "fill", &[5], &mut args),
        Err(MarshalError::OutputNotFound(5))
    );
    assert_eq!(
        call_with_outputs(&module, "fill", &[1], &mut args),
        Err(MarshalError::OutputNotArray(1))
    );
    assert_eq!(args[0], Value::Int32Array(vec![1]), "failed validation must not run the call");

    let (_, scalars) = compile(PROGRAMS);
    assert_eq!(
        call_with_outputs(&scalars, "gcd", &[0], &mut [Value::Int32(4), Value::Int32(6)]),
        Err(MarshalError::OutputWithoutArrays)
    );
}

// =============================================================================
// Concurrency & hooks
// =============================================================================

#[test]
fn test_concurrent_calls_are_independent() {
    let (_, module) = compile(ARRAYS);
    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let module = &module;
                scope.spawn(move || {
                    let items: Vec<i32> = (0..1000).map(|i| i * t).collect();
                    let expected: i32 = items.iter().sum();
                    for _ in 0..10 {
                        let mut args = [Value::Int32Array(items.clone()), Value::Int32(t)];
                        call_with_outputs(module, "fill", &[0], &mut args).unwrap();
                        assert_eq!(args[0], Value::Int32Array(vec![t; 1000]));
                        assert_eq!(
                            call(module, "sumArrayWhile", &mut [Value::Int32Array(items.clone())]),
                            Ok(Value::Int32(expected))
                        );
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
    });
}

#[test]
fn test_timing_hooks_cover_every_phase() {
    use std::sync::Arc;
    use wasm_transpiler::TimingHooks;

    let timing = Arc::new(TimingHooks::new());
    let transpiler = Transpiler::with_hooks(timing.clone());
    let module = transpiler.transpile(ARRAYS).unwrap();

    let mut wrapper = transpiler.call_wrapper(&module);
    wrapper.set_function_name("setFirst").set_out_parameters(&[0]);
    wrapper.call(&mut [Value::Int32Array(vec![1, 2, 3])]).unwrap();

    let recorded = timing.timing();
    assert!(recorded.compilation.is_some());
    assert!(recorded.import.is_some());
    assert!(recorded.execution.is_some());
    assert!(recorded.export.is_some());
}

#[test]
fn test_export_hooks_fire_without_output_arrays() {
    use std::sync::Arc;
    use wasm_transpiler::TimingHooks;

    let timing = Arc::new(TimingHooks::new());
    let transpiler = Transpiler::with_hooks(timing.clone());
    let module = transpiler.transpile(ARRAYS).unwrap();

    let mut wrapper = transpiler.call_wrapper(&module);
    wrapper.set_function_name("setFirst");
    wrapper.call(&mut [Value::Int32Array(vec![1, 2, 3])]).unwrap();
    assert!(timing.timing().export.is_some(), "export phase must be reported on every call");

    timing.reset();
    let (_, scalars) = compile(PROGRAMS);
    let mut wrapper = transpiler.call_wrapper(&scalars);
    wrapper.set_function_name("gcd");
    wrapper.call(&mut [Value::Int32(12), Value::Int32(18)]).unwrap();
    let recorded = timing.timing();
    assert!(recorded.import.is_some());
    assert!(recorded.execution.is_some());
    assert!(recorded.export.is_some());
}

#[test]
fn test_json_unit() {
    let program = r#"{
        "body": [
            { "Function": {
                "name": "double",
                "params": [ { "pattern": { "Identifier": "x" } } ],
                "body": [
                    { "Return": { "kind": { "Binary": {
                        "op": "Mul",
                        "left": { "kind": { "Identifier": "x" } },
                        "right": { "kind": { "Number": 2.0 } }
                    } } } }
                ]
            } }
        ]
    }"#;
    let signatures = r#"{ "double": { "parameters": ["Int32"], "return_type": "Int32" } }"#;
    let transpiler = Transpiler::new();
    let module = transpiler.transpile_json(program, signatures).unwrap();
    assert_eq!(module.exports(), &["double".to_string()]);
    assert_eq!(call(&module, "double", &mut [Value::Int32(21)]), Ok(Value::Int32(42)));
}
