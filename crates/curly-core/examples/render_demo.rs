//! Rendering demo.
//!
//! Shows raw values, text templates, class shorthand and custom delimiters.
//!
//! ```bash
//! RUST_LOG=debug cargo run -p curly-core --example render_demo
//! ```

use curly_core::{Context, CurlyConfig, TemplateEngine, Value};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing for debug output
    tracing_subscriber::fmt::init();

    let data = Context::new()
        .set("user", "ada")
        .set("admin", true)
        .set("unread", 0)
        .set(
            "tags",
            Value::array(vec![Value::from("rust"), Value::from("templates")]),
        )
        .function("shout", |_this, args| {
            let text = args.first().cloned().unwrap_or_default();
            Ok(Value::string(text.to_string().to_uppercase()))
        })
        .build();

    let engine = TemplateEngine::new(CurlyConfig::from_env());

    // A lone expression keeps its type
    let count = engine.render("{ tags.length + unread }", &data)?;
    println!("raw value: {:?}", count);

    // Missing variables never throw
    let missing = engine.render("{ profile.address.city }", &data)?;
    println!("missing: {:?}", missing);

    // Text templates always produce strings; zero is kept
    let greeting = engine.render("Hello { shout(user) }, you have { unread } new messages", &data)?;
    println!("{}", greeting);

    // Class shorthand joins the names whose values are truthy
    let classes = engine.render("{ admin: admin, guest: !admin, has-tags: tags.length }", &data)?;
    println!("class=\"{}\"", classes);

    // CSS blocks are easier to write with a different delimiter pair
    engine.set_brackets(Some("{{ }}"));
    let page = engine.render(
        r#"<style>body { margin: 0 }</style>
<ul>{{ tags.map(function (t) { return "<li>" + t + "</li>" }).join("") }}</ul>"#,
        &data,
    )?;
    println!("{}", page);

    engine.set_brackets(None);
    let template = engine.compile("{ user } is { admin ? \"an admin\" : \"a guest\" }")?;
    println!("generated code: {}", template.code());
    println!("{}", template.render(&data)?);

    Ok(())
}
