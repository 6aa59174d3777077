//! End-to-end rendering through the public engine API.

use curly_core::value::Properties;
use curly_core::{CurlyError, Interpreter, TemplateEngine, Value};
use serde_json::json;

fn data() -> Value {
    data_with_arr(Value::array(vec![Value::from(2)]))
}

fn data_with_arr(arr: Value) -> Value {
    Value::object_from([
        ("yes", Value::Bool(true)),
        ("no", Value::Bool(false)),
        ("str", Value::from("x")),
        ("obj", Value::object_from([("val", Value::from(2))])),
        ("arr", arr),
        ("x", Value::from(2)),
        ("$a", Value::from(0)),
        ("$b", Value::from(1)),
        ("esc", Value::from("'\n\\")),
        (
            "fn",
            Value::function("fn", |_this, args| {
                let s = match args.first() {
                    Some(v) if !v.is_nullish() => v.to_string(),
                    _ => String::new(),
                };
                Ok(Value::string(format!("hi {}", s)))
            }),
        ),
    ])
}

fn engine() -> TemplateEngine {
    TemplateEngine::default().with_evaluator(Interpreter::new().with_global("globalVar", 5))
}

fn engine_with(brackets: &str) -> TemplateEngine {
    let engine = engine();
    engine.set_brackets(Some(brackets));
    engine
}

fn render(source: &str) -> Value {
    engine().render(source, &data()).unwrap()
}

fn render_error(source: &str) -> bool {
    engine().render(source, &data()).is_err()
}

fn prop(value: &Value, key: &str) -> Value {
    match value {
        Value::Object(props) => props.read().get(key).cloned().unwrap_or_default(),
        _ => Value::Undefined,
    }
}

fn s(text: &str) -> Value {
    Value::from(text)
}

fn n(number: i32) -> Value {
    Value::from(number)
}

#[test]
fn test_expressions_return_raw_values() {
    assert_eq!(render("{ 1 }"), n(1));
    assert_eq!(render("{ x }"), n(2));
    assert_eq!(render("{ str }"), s("x"));
    assert_eq!(render("{ null }"), Value::Null);
    assert_eq!(render("{ no }"), Value::Bool(false));
    assert_eq!(render("{ yes }"), Value::Bool(true));
    assert_eq!(render("{ 0 }"), n(0));
    assert_eq!(render("{ void 0 }"), Value::Undefined);
    assert_eq!(render("{ 1/**/ /*/* */ }"), n(1));
}

#[test]
fn test_expressions_return_shared_values() {
    let engine = engine();
    let data = data();
    for key in ["obj", "arr", "fn"] {
        let out = engine.render(&format!("{{ {} }}", key), &data).unwrap();
        assert!(out.ptr_eq(&prop(&data, key)), "{} is not the context value", key);
    }
}

#[test]
fn test_templates_return_strings() {
    assert_eq!(render("{ 1 } "), s("1 "));
    assert_eq!(render("{ obj } "), s("[object Object] "));
    assert_eq!(render(" "), s(" "));
    assert_eq!(render(r"\{ }"), s("{ }"));
    assert_eq!(render("/* */"), s("/* */"));
}

#[test]
fn test_empty_expressions() {
    assert_eq!(render("{}"), Value::Undefined);
    assert_eq!(render("{ }"), Value::Undefined);
    assert_eq!(render(""), s(""));
    assert_eq!(render("{ } "), s(" "));
    assert_eq!(render("{ /**/ /*/* */ }"), Value::Undefined);
}

#[test]
fn test_undefined_values() {
    assert_eq!(render("{ nonExistingVar }"), Value::Undefined);
    assert_eq!(render("{ !nonExistingVar }"), Value::Bool(true));
    assert_eq!(render(r#"{ nonExistingVar ? "yes" : "no" }"#), s("no"));
    assert_eq!(render(r#"{ !nonExistingVar ? "yes" : "no" }"#), s("yes"));

    assert_eq!(render(" { nonExistingVar }"), s(" "));
    assert_eq!(render(" { no }"), s(" "));
}

#[test]
fn test_falsy_values_in_templates() {
    for source in [" { undefined }", " { void 0 }", " { false }", " { null }", " { NaN }"] {
        assert_eq!(render(source), s(" "), "{}", source);
    }
    assert_eq!(render(" { 0 }"), s(" 0"));
}

#[test]
fn test_expressions_are_scripts() {
    assert_eq!(render("{ obj.val }"), n(2));
    assert_eq!(render(r#"{ obj["val"] }"#), n(2));
    assert_eq!(render("{ arr[0] }"), n(2));
    assert_eq!(render("{ arr[0]; }"), n(2));
    assert_eq!(render("{ arr.pop() }"), n(2));
    assert_eq!(render("{ fn(str) }"), s("hi x"));
    assert_eq!(render(r#"{ yes && "ok" }"#), s("ok"));
    assert_eq!(render(r#"{ no && "ok" }"#), Value::Bool(false));
    assert_eq!(render("{ false || null || !no && yes }"), Value::Bool(true));
    assert_eq!(render(r#"{ !no ? "yes" : "no" }"#), s("yes"));
    assert_eq!(render(r#"{ !yes ? "yes" : "no" }"#), s("no"));
    assert_eq!(render("{ typeof Math.random() }"), s("number"));
    assert_eq!(render(r#"{ fn("there") }"#), s("hi there"));
    assert_eq!(render(r#"{ str == "x" }"#), Value::Bool(true));
    assert_eq!(render("{ /x/.test(str) }"), Value::Bool(true));
    assert_eq!(render(r#"{ true ? "a b c" : "foo" }"#), s("a b c"));
    assert_eq!(render(r#"{ true ? "a \"b\" c" : "foo" }"#), s(r#"a "b" c"#));
    assert_eq!(render(r#"{ str + " y" + ' z'}"#), s("x y z"));
    assert_eq!(render("{ esc }"), s("'\n\\"));
    assert_eq!(render("{ $a }"), n(0));
    assert_eq!(render("{ $a + $b }"), n(1));
    assert_eq!(render("{ this.str }"), s("x"));
    assert_eq!(render(r#"{ "c:\\" }"#), s(r"c:\"));
    assert_eq!(render(r#"{ ({ u: "c:\\" }).u }"#), s(r"c:\"));
}

#[test]
fn test_globals() {
    assert_eq!(render("{ globalVar }"), n(5));
    assert_eq!(render("{ x + globalVar }"), n(7));
}

#[test]
fn test_comments_in_expressions() {
    assert_eq!(render("{ /* comment */ /* as*/ }"), Value::Undefined);
    assert_eq!(render(" { /* comment */ }"), s(" "));
    assert_eq!(render("{ 1 /* comment */ + 1 }"), n(2));
    assert_eq!(render("{ 1 /* comment */ + 1 } "), s("2 "));
    assert_eq!(render("{ /**/ }"), Value::Undefined);
    assert_eq!(render(r"{ /* /\* /* *\/ */ }"), Value::Undefined);
    assert_eq!(render(r#"{ typeof/**/str === "string" }"#), Value::Bool(true));
}

#[test]
fn test_comments_inside_strings() {
    assert_eq!(render(r#"{ "a" + "/*b*/" + "c" }"#), s("a c"));
    assert_eq!(render(r#"{ "a" + "/\*b*/" + "c" }"#), s("a/*b*/c"));
    assert_eq!(render(r#"{ "a" + "/\*b*\/" + "c" }"#), s("a/*b*/c"));
}

#[test]
fn test_comments_in_text() {
    assert_eq!(render("/* */{ /* */ }/**/"), s("/* *//**/"));
    assert_eq!(render(r#"/* {"x"} *//**/"#), s("/* x *//**/"));
    assert_eq!(render("/**/ /*/**/"), s("/**/ /*/**/"));
}

#[test]
fn test_multiple_expressions() {
    assert_eq!(render("{ 1 }{ 1 }"), s("11"));
    assert_eq!(render("{ 1 }{ 1 } "), s("11 "));
    assert_eq!(render(" { 1 }{ 1 }"), s(" 11"));
    assert_eq!(render("{ 1 } { 1 }"), s("1 1"));
    assert_eq!(render("\n  { yes \n ? 2 \n : 4} \n"), s("\n  2 \n"));
}

#[test]
fn test_class_shorthand_names() {
    assert_eq!(render("{ ok : yes }"), s("ok"));
    assert_eq!(render(r#"{ "a" : yes, 'b': yes, c: yes }"#), s("a b c"));
    assert_eq!(render("{ a_b-c3: yes }"), s("a_b-c3"));
    assert_eq!(render("{ my-class: yes }"), s("my-class"));
    assert_eq!(render(r#"{ "a b": yes }"#), s("a b"));
    assert_eq!(render("{ _: yes }"), s("_"));
    assert_eq!(render("{ -A1: yes }"), s("-A1"));
    assert_eq!(render("{ -_: yes }"), s("-_"));
    assert_eq!(render(r#"{ "á": yes }"#), s("á"));
    assert_eq!(render("{ \"\u{00AE}\": yes }"), s("\u{00AE}"));
    assert_eq!(render(r#"{ "\"a b\"": yes }"#), s(r#""a b""#));
}

#[test]
fn test_class_shorthand_expressions() {
    assert_eq!(render("{ loading: !nonExistingVar.length }"), s("loading"));
    assert_eq!(render("{ a: !no, b: yes }"), s("a b"));
    assert_eq!(render("{ y: false || null || !no && yes }"), s("y"));
    assert_eq!(render("{ y: 4 > 2 }"), s("y"));
    assert_eq!(render("{ y: fn() }"), s("y"));
    assert_eq!(render(r#"{ y: str == "x" }"#), s("y"));
    assert_eq!(render("{ y: new Date() }"), s("y"));
    assert_eq!(render("{ ok: fn(1, 2) }"), s("ok"));
    assert_eq!(render("{ ok: fn([1, 2]) }"), s("ok"));
    assert_eq!(render("{ ok: fn({a: 1, b: 1}) }"), s("ok"));
}

#[test]
fn test_class_shorthand_parentheses() {
    assert_eq!(render("{ primary: (obj.val === 2)  }"), s("primary"));
    assert_eq!(render("{ ok: [1,2].length === (2) }"), s("ok"));
    assert_eq!(render("{ ok: (true !== (!foo === nonExistingVar.bar.x())) }"), s("ok"));
    assert_eq!(
        render(r#"{ ok: ((this.obj.val === 2) && ((this.str) !== "@"))  }"#),
        s("ok")
    );
}

#[test]
fn test_class_shorthand_invalid_names() {
    assert!(render_error("{ á: yes }"));
    assert!(render_error("{ -1A: yes }"));
    assert!(render_error("{ --A: yes }"));
    assert!(render_error("{ 1A: yes }"));
}

#[test]
fn test_class_shorthand_swallows_errors() {
    let engine = engine();
    let render_arr = |source: &str, arr: Value| engine.render(source, &data_with_arr(arr)).unwrap();

    assert_eq!(render_arr("{ ok: arr.slice(0)[0] }", Value::array(vec![])), s(""));
    assert_eq!(render_arr("{ ok: arr.slice(0)[0] }", Value::Null), s(""));
    assert_eq!(render_arr("{ ok: arr[0].getDate() < 5 }", Value::array(vec![n(10)])), s(""));
}

#[test]
fn test_html_in_expressions() {
    assert_eq!(render(r#"{ [yes,no].join("<br>") }"#), s("true<br>false"));
    assert_eq!(
        render(r#"<p foo="{ "x" }">{ [yes,no].join("<br>") }</p>"#),
        s(r#"<p foo="x">true<br></p>"#)
    );
    assert_eq!(render(r#"{ str ? "<br>" + str : "<hr>" }"#), s("<br>x"));
}

#[test]
fn test_line_endings_in_text() {
    assert_eq!(render("\r\n\n { 1\r\n } \r\r\n"), s("\n\n 1 \n\n"));
    assert_eq!(
        render("<p style=\"top:0;\rleft:0\r\n\"></p>"),
        s("<p style=\"top:0;\nleft:0\n\"></p>")
    );
    assert_eq!(render(r#"<p js="\r\n"></p>"#), s("<p js=\"\r\n\"></p>"));
}

#[test]
fn test_line_endings_in_expressions() {
    assert_eq!(render("{\n yes \r\n ? 1\n : 0}"), n(1));
    assert_eq!(render("{ yes\n||\r\n\nno\r }"), Value::Bool(true));
    assert_eq!(render(" { ok: yes\n||\r\n\nno\r } "), s(" ok "));
    assert_eq!(render(" { ok:\r\ntypeof\r0\n === \"number\" } "), s(" ok "));

    assert_eq!(render("{ ok: \"\r\n\".length === 2 }"), s("ok"));
    assert_eq!(render("{ \"y\ne\r\n\ns\r\" }"), s("y\ne\r\n\ns\r"));
    assert_eq!(render("{ \"y\ne\\r\\n\\ns\r\" }"), s("y\ne\r\n\ns\r"));

    assert_eq!(render("{ \"a\nb\r\nc\n\nd\re\": yes }"), s("a b c  d e"));
    assert_eq!(render("{ \"\n a\nb\rc \r\n\": yes }"), s("a b c"));
}

#[test]
fn test_brackets_in_text() {
    assert_eq!(render(r#"\{ } \} { "0" } }"#), s("{ } } 0 }"));
    assert_eq!(render(r#"{ } \} { "0" } { }"#), s(" } 0 "));
    assert_eq!(render(r#"\{ { "\{" } \}"#), s("{ { }"));
    assert_eq!(render(r"\{\}{ /**/ }"), s("{}"));
}

#[test]
fn test_escaped_brackets_in_expressions() {
    assert_eq!(render(r#"{ "\{ 1 \}" }"#), s("{ 1 }"));
    assert_eq!(render(r"\{ 1 }"), s("{ 1 }"));
    assert_eq!(render(r#"{ "\}" }"#), s("}"));
    assert_eq!(render(r#"{ "\{" }"#), s("{"));
    assert_eq!(render(r#"a{ "b\{cd" }e"#), s("ab{cde"));

    for source in [r"{ \{ \} }", r"{\{\}}", r"{{\}}", r"{\{}}"] {
        assert!(matches!(render(source), Value::Object(_)), "{}", source);
    }
}

#[test]
fn test_unescaped_brackets_in_expressions() {
    assert_eq!(render("{ JSON.stringify({ x: 5 }) }"), s(r#"{"x":5}"#));
    assert_eq!(render(r#"a{ "b{c}d" }e { "{f{f}}" } g"#), s("ab{c}de {f{f}} g"));
    assert_eq!(render(r#"a{ "b{cd" }e"#), s("ab{cde"));
    assert_eq!(render(r#"a{ "b}cd" }e"#), s("ab}cde"));

    assert_eq!(render("{{}}"), Value::object(Properties::new()));
    assert_eq!(
        render(r#"{{str: "s", num:{}}}"#).to_json().unwrap(),
        json!({ "str": "s", "num": {} })
    );
    assert_eq!(render(" {{ a:1 }+{}}"), s(" [object Object][object Object]"));
    assert!(matches!(render("{ function(){} }"), Value::Function(_)));
}

#[test]
fn test_square_brackets() {
    let engine = engine_with("[ ]");
    let render = |source: &str| engine.render(source, &data()).unwrap();

    assert_eq!(render("[ x ]"), n(2));
    assert_eq!(render(r"[ str\[0\] ]"), s("x"));
    assert_eq!(render("[ str[0] ]"), s("x"));
    assert_eq!(render("[ [1][0] ]"), n(1));
    assert_eq!(render(r#"a,[["b","c"]],d"#), s("a,b,c,d"));
    assert_eq!(render(r#"a[ "b[c]d" ]e [ "[f[f]]" ] g"#), s("ab[c]de [f[f]] g"));
    assert_eq!(render("{ x }"), s("{ x }"));
}

#[test]
fn test_percent_brackets() {
    let engine = engine_with("<% %>");
    let render = |source: &str| engine.render(source, &data()).unwrap();

    assert_eq!(render("<% x %>"), n(2));
    assert_eq!(render(r#".<% "<% %>" %>. <% ".%> <%." %>"#), s(".<% %>. .%> <%."));
    assert_eq!(render(r#"<% "<%= 0 %>" %>"#), s("<%= 0 %>"));
    assert_eq!(render(r#"a<% "b<%c%>d" %>e <% "<%f<%f%>%>" %> g"#), s("ab<%c%>de <%f<%f%>%> g"));
}

#[test]
fn test_double_brackets() {
    let engine = engine_with("[[ ]]");
    assert_eq!(engine.render("obj=[[arr[0]]]", &data()).unwrap(), s("obj=2"));

    let engine = engine_with("(( ))");
    assert_eq!(engine.render("obj=((arr.pop()))", &data()).unwrap(), s("obj=2"));

    let engine = engine_with("{{ }}");
    let render = |source: &str| engine.render(source, &data()).unwrap();
    assert_eq!(render(r#"a{{ "b{{c}}d" }}e {{ "{f{{f}}}" }} g"#), s("ab{{c}}de {f{{f}}} g"));
    assert_eq!(render("obj={{{}}}"), s("obj=[object Object]"));
    assert_eq!(render("obj={{{a:{b:0}}}}"), s("obj=[object Object]"));

    let engine = engine_with("([ ])");
    assert!(matches!(engine.render("([ [].concat([0]) ])", &data()).unwrap(), Value::Array(_)));
    assert_eq!(engine.render("([([1])[0]])", &data()).unwrap(), n(1));
}

#[test]
fn test_asymmetric_brackets() {
    let engine = engine_with("${ }");
    let render = |source: &str| engine.render(source, &data()).unwrap();
    assert_eq!(render("${ x }"), n(2));
    assert_eq!(render(r#"a${ "b{c}d" }e"#), s("ab{c}de"));
    assert_eq!(render(r#"a${ "b{c\}d" }e"#), s("ab{c}de"));
    assert_eq!(render("a${{}}e"), s("a[object Object]e"));
    assert_eq!(render(r"a${{\}}e"), s("a[object Object]e"));

    let engine = engine_with("${{ }}");
    let render = |source: &str| engine.render(source, &data()).unwrap();
    assert_eq!(render("a${{{a: {}}}}e"), s("a[object Object]e"));
    assert_eq!(render("a${{{ a: {} }}}e"), s("a[object Object]e"));
    assert_eq!(render("a${{ {a: {}} }}e"), s("a[object Object]e"));
    assert_eq!(render(r"a${{{ a: {\}}}}e"), s("a[object Object]e"));
    assert_eq!(render(r"a${{{ a: {\}} }}e"), s("a[object Object]e"));

    let engine = engine_with("{{ }");
    assert_eq!(engine.render("{{{ }}", &data()).unwrap(), Value::object(Properties::new()));
    assert_eq!(engine.render(r"{{{ \}}", &data()).unwrap(), Value::object(Properties::new()));

    // A right delimiter that ends with the index bracket cannot close after
    // an index expression, escaped or not.
    let engine = engine_with("[ ]]");
    assert!(engine.render("[str[0]]]", &data()).is_err());
    assert!(engine.render(r"[str[0\]]]", &data()).is_err());
}

#[test]
fn test_reset_brackets() {
    let engine = engine_with("<% %>");
    engine.set_brackets(None);
    assert_eq!(engine.render("{ x }", &data()).unwrap(), n(2));
    engine.set_brackets(Some(""));
    assert_eq!(engine.render("{ x } ", &data()).unwrap(), s("2 "));
}

#[test]
fn test_invalid_brackets() {
    let engine = engine_with("<%%>");
    assert!(matches!(engine.render("<% x %>", &data()), Err(CurlyError::Config(_))));
}

#[test]
fn test_consistency() {
    assert_eq!(render("{ ok: !nonExistingVar.test(foo === !bar) }"), s("ok"));
    assert_eq!(render(r#"{ !nonExistingVar.test(foo === !bar) ? "ok" : "" }"#), s("ok"));
    assert_eq!(render("{ ok: !nonExistingVar, bar: bar }"), s("ok"));
    assert_eq!(
        render(r#"{ [!nonExistingVar ? "ok" : "", bar ? "bar" : ""].join(" ").trim() }"#),
        s("ok")
    );
}

#[test]
fn test_self_containing_array_in_text() {
    let data = data_with_arr(Value::array(vec![n(1)]));
    let engine = engine();
    assert_eq!(engine.render("{ arr.push(arr) }", &data).unwrap(), n(2));
    assert_eq!(engine.render(" { arr }", &data).unwrap(), s(" 1,"));
    assert_eq!(engine.render("{ arr.join('-') }", &data).unwrap(), s("1-"));
    assert_eq!(engine.render("{ JSON.stringify(arr) }", &data).unwrap(), Value::Undefined);
    assert_eq!(engine.render("[{ JSON.stringify(arr) }]", &data).unwrap(), s("[]"));
}

#[test]
fn test_deeply_nested_calls_fail_to_compile() {
    let nested = format!("{}x{}", "fn(".repeat(10_000), ")".repeat(10_000));
    let engine = engine();
    assert!(matches!(
        engine.render(&format!("{{ {} }}", nested), &data()),
        Err(CurlyError::Syntax { .. })
    ));
    assert!(engine.render(&format!("<p>{{ {} }}</p>", nested), &data()).is_err());

    let shallow = format!("{}x{}", "fn(".repeat(20), ")".repeat(20));
    assert!(engine.render(&format!("{{ {} }}", shallow), &data()).is_ok());
}

#[test]
fn test_global_object() {
    assert!(matches!(render("{ global }"), Value::Object(_)));
    assert_eq!(render("{ global.globalVar }"), n(5));
    assert_eq!(render("{ typeof global.Math }"), s("object"));
}

#[test]
fn test_unbalanced_shorthand_fails() {
    assert!(render_error("{ a: 1, 2 }"));
}
