//! Integration tests for inherit, block and include across templates

use pretty_assertions::assert_eq;
use tessera::{vars, Config, Error, Finder, MemoryLoader, Vars};

fn finder(templates: &[(&str, &str)]) -> Finder {
    let loader = templates
        .iter()
        .fold(MemoryLoader::new(), |loader, (path, source)| loader.with(path, *source));
    Finder::new(loader, Config::default())
}

#[tokio::test]
async fn test_child_overrides_parent_block() {
    let finder = finder(&[
        ("base.html", "<title><% block title %>Old Title<% end %></title>\n<%r= body() %>"),
        (
            "page.html",
            "<% inherit \"base.html\" %><% block title %>New Title<% end %>This is body.",
        ),
    ]);
    let out = finder.render("page.html", Vars::new()).await.unwrap();
    assert_eq!(out, "<title>New Title</title>\nThis is body.");
}

#[tokio::test]
async fn test_parent_renders_its_own_block_without_override() {
    let finder = finder(&[
        ("base.html", "<title><% block title %>Default<% end %></title><%r= body() %>"),
        ("page.html", "<% inherit \"base.html\" %>body"),
    ]);
    assert_eq!(
        finder.render("page.html", Vars::new()).await.unwrap(),
        "<title>Default</title>body"
    );
}

#[tokio::test]
async fn test_parent_block_reaches_overridden_definition() {
    let finder = finder(&[
        ("base.html", "<% block title %>Old Title<% end %>"),
        (
            "page.html",
            "<% inherit \"base.html\" %><% block title %>The old title is <%r= parent_block(\"title\") %>.<% end %>",
        ),
    ]);
    assert_eq!(
        finder.render("page.html", Vars::new()).await.unwrap(),
        "The old title is Old Title."
    );
}

#[tokio::test]
async fn test_three_level_inheritance_keeps_leaf_override() {
    let finder = finder(&[
        ("root.html", "[<% block title %>root<% end %>]<%r= body() %>"),
        (
            "middle.html",
            "<% inherit \"root.html\" %><% block title %>middle<% end %>(<%r= body() %>)",
        ),
        (
            "leaf.html",
            "<% inherit \"middle.html\" %><% block title %>leaf<% end %>leaf-body",
        ),
    ]);
    assert_eq!(
        finder.render("leaf.html", Vars::new()).await.unwrap(),
        "[leaf](leaf-body)"
    );
}

#[tokio::test]
async fn test_parent_block_walks_the_whole_chain() {
    let finder = finder(&[
        ("root.html", "<% block title %>root<% end %>"),
        (
            "middle.html",
            "<% inherit \"root.html\" %><% block title %>middle/<%r= parent_block(\"title\") %><% end %>",
        ),
        (
            "leaf.html",
            "<% inherit \"middle.html\" %><% block title %>leaf/<%r= parent_block(\"title\") %><% end %>",
        ),
    ]);
    assert_eq!(
        finder.render("leaf.html", Vars::new()).await.unwrap(),
        "leaf/middle/root"
    );
}

#[tokio::test]
async fn test_block_unknown_to_parent_draws_in_place() {
    let finder = finder(&[
        ("base.html", "<% block title %>T<% end %>|<%r= body() %>"),
        (
            "page.html",
            "<% inherit \"base.html\" %><% block sidebar %>S<% end %>body",
        ),
    ]);
    assert_eq!(
        finder.render("page.html", Vars::new()).await.unwrap(),
        "T|Sbody"
    );
}

#[tokio::test]
async fn test_undeclared_override_is_not_visible_to_parent() {
    let finder = finder(&[
        ("base.html", "<%r= block(\"sidebar\") %>"),
        ("page.html", "<% inherit \"base.html\" %><% block sidebar %>S<% end %>"),
    ]);
    let err = finder.render("page.html", Vars::new()).await.unwrap_err();
    assert!(
        matches!(err, Error::Render(ref m) if m.contains("not defined")),
        "{}",
        err
    );
}

#[tokio::test]
async fn test_block_declared_in_middle_layout() {
    let finder = finder(&[
        ("root.html", "<html><%r= body() %></html>"),
        (
            "middle.html",
            "<% inherit \"root.html\" %><div><% block content %>default<% end %></div>",
        ),
        (
            "leaf.html",
            "<% inherit \"middle.html\" %><% block content %>Leaf<% end %>",
        ),
    ]);
    assert_eq!(
        finder.render("leaf.html", Vars::new()).await.unwrap(),
        "<html><div>Leaf</div></html>"
    );
    assert_eq!(
        finder.render("middle.html", Vars::new()).await.unwrap(),
        "<html><div>default</div></html>"
    );
}

#[tokio::test]
async fn test_variables_reach_the_parent() {
    let finder = finder(&[
        ("base.html", "<%= site %>: <%= heading %>|<%r= body() %>"),
        (
            "page.html",
            "<% inherit \"base.html\" %><% global heading %><% let heading = \"News\" %>items",
        ),
    ]);
    let out = finder
        .render("page.html", vars([("site", "Example")]))
        .await
        .unwrap();
    assert_eq!(out, "Example: News|items");
}

#[tokio::test]
async fn test_child_draws_before_parent() {
    let finder = finder(&[
        (
            "base.html",
            "<% global order %><% let order = order + \"p\" %><%= order %>",
        ),
        (
            "page.html",
            "<% inherit \"base.html\" %><% global order %><% let order = order + \"c\" %>",
        ),
    ]);
    let out = finder
        .render("page.html", vars([("order", "")]))
        .await
        .unwrap();
    assert_eq!(out, "cp");
}

#[tokio::test]
async fn test_second_inherit_is_render_error() {
    let finder = finder(&[
        ("a.html", "A"),
        ("b.html", "B"),
        ("page.html", "<% inherit \"a.html\" %><% inherit \"b.html\" %>"),
    ]);
    let err = finder.render("page.html", Vars::new()).await.unwrap_err();
    assert!(
        matches!(err, Error::Render(ref m) if m.contains("already inherits")),
        "{}",
        err
    );
}

#[tokio::test]
async fn test_missing_parent_is_not_found() {
    let finder = finder(&[("page.html", "<% inherit \"gone.html\" %>")]);
    let err = finder.render("page.html", Vars::new()).await.unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }), "{}", err);
}

#[tokio::test]
async fn test_include_splices_content() {
    let finder = finder(&[
        ("nav.html", "<a href=\"/\"><%= name %></a>"),
        ("page.html", "<nav><% include \"nav.html\" %></nav>"),
    ]);
    assert_eq!(
        finder.render("page.html", vars([("name", "Home")])).await.unwrap(),
        "<nav><a href=\"/\">Home</a></nav>"
    );
}

#[tokio::test]
async fn test_include_twice_renders_twice() {
    let finder = finder(&[
        ("dot.html", "."),
        ("page.html", "<% include \"dot.html\" %><% include \"dot.html\" %>"),
    ]);
    assert_eq!(finder.render("page.html", Vars::new()).await.unwrap(), "..");
}

#[tokio::test]
async fn test_included_template_can_inherit() {
    let finder = finder(&[
        ("frame.html", "[<%r= body() %>]"),
        ("card.html", "<% inherit \"frame.html\" %>card"),
        ("page.html", "<% include \"card.html\" %>-<% include \"card.html\" %>"),
    ]);
    assert_eq!(
        finder.render("page.html", Vars::new()).await.unwrap(),
        "[card]-[card]"
    );
}

#[tokio::test]
async fn test_include_does_not_leak_assignments() {
    let finder = finder(&[
        ("set.html", "<% global x %><% let x = \"inner\" %>"),
        ("page.html", "<% include \"set.html\" %><%= x %>"),
    ]);
    assert_eq!(
        finder.render("page.html", vars([("x", "outer")])).await.unwrap(),
        "outer"
    );
}

#[tokio::test]
async fn test_include_after_finder_dropped_is_render_error() {
    let finder = finder(&[("nav.html", "nav"), ("page.html", "<% include \"nav.html\" %>")]);
    let template = finder.find("page.html").await.unwrap();
    drop(finder);
    let err = template.render(Vars::new()).await.unwrap_err();
    assert!(
        matches!(err, Error::Render(ref m) if m.contains("finder was dropped")),
        "{}",
        err
    );
}

#[tokio::test]
async fn test_paths_resolve_relative_to_the_including_template() {
    let finder = finder(&[
        ("layouts/base.html", "<%r= body() %><% include \"footer.html\" %>"),
        ("layouts/footer.html", "!"),
        ("partials/nav.html", "nav "),
        (
            "pages/index.html",
            "<% inherit \"../layouts/base.html\" %><% include \"/partials/nav.html\" %>index",
        ),
    ]);
    assert_eq!(
        finder.render("pages/index.html", Vars::new()).await.unwrap(),
        "nav index!"
    );
}

#[tokio::test]
async fn test_path_traversal_is_not_found() {
    let finder = finder(&[("page.html", "<% include \"../hijack.html\" %>")]);
    assert!(matches!(
        finder.find("../hijack.html").await.unwrap_err(),
        Error::NotFound { .. }
    ));
    assert!(matches!(
        finder.render("page.html", Vars::new()).await.unwrap_err(),
        Error::NotFound { .. }
    ));
}

#[tokio::test]
async fn test_runaway_include_hits_nesting_limit() {
    let finder = finder(&[("loop.html", "<% include \"loop.html\" %>")]);
    let err = finder.render("loop.html", Vars::new()).await.unwrap_err();
    assert!(
        matches!(err, Error::Render(ref m) if m.contains("nesting limit")),
        "{}",
        err
    );
}

#[tokio::test]
async fn test_computed_include_path() {
    let finder = finder(&[
        ("widgets/clock.html", "tick"),
        ("page.html", "<% include \"widgets/\" + widget + \".html\" %>"),
    ]);
    assert_eq!(
        finder
            .render("page.html", vars([("widget", "clock")]))
            .await
            .unwrap(),
        "tick"
    );
}
