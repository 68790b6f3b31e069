//! Parser implementation using chumsky

use std::sync::Arc;

use chumsky::input::{Stream, ValueInput};
use chumsky::prelude::*;

use crate::error::ParseError;
use crate::parser::ast::*;
use crate::parser::lexer::{lex, Delims, Token};

/// A top-level item: a `{{define}}` or an ordinary node
#[derive(Debug, Clone)]
enum Item {
    Define(Spanned<String>, Vec<Spanned<Node>>),
    Node(Spanned<Node>),
}

/// Parse template text into trees
///
/// The tree named `name` holds the text outside any `{{define}}`; every
/// `{{define}}` and `{{block}}` produces a tree of its own. `is_function`
/// decides which identifiers are callable.
pub fn parse(
    name: &str,
    text: &str,
    delims: &Delims,
    is_function: &dyn Fn(&str) -> bool,
) -> Result<Vec<Tree>, Vec<ParseError>> {
    let tokens = lex(text, delims).map_err(|e| vec![e])?;
    let len = text.len();

    let token_iter = tokens.into_iter().map(|(tok, span)| (tok, span.into()));
    let token_stream = Stream::from_iter(token_iter).map((len..len).into(), |(t, s): (_, _)| (t, s));

    let items = template_parser()
        .parse(token_stream)
        .into_result()
        .map_err(|errs| errs.into_iter().map(ParseError::from).collect::<Vec<_>>())?;

    let mut assembler = TreeAssembler {
        parse_name: name.to_string(),
        text: Arc::from(text),
        is_function,
        trees: Vec::new(),
        errors: Vec::new(),
    };
    let mut top = Vec::new();
    for item in items {
        match item {
            Item::Define(def_name, mut body) => {
                assembler.visit_list(&mut body, false);
                assembler.add(def_name.node, def_name.span, body);
            }
            Item::Node(mut node) => {
                assembler.visit_node(&mut node, false);
                top.push(node);
            }
        }
    }
    assembler.add(name.to_string(), 0..0, top);

    if assembler.errors.is_empty() {
        Ok(assembler.trees)
    } else {
        Err(assembler.errors)
    }
}

/// Helper to extract span range from chumsky's MapExtra
fn span_range(e: &impl chumsky::span::Span<Offset = usize>) -> std::ops::Range<usize> {
    e.start()..e.end()
}

fn pipeline_parser<'a, I>() -> impl Parser<'a, I, Pipeline, extra::Err<Rich<'a, Token>>> + Clone
where
    I: ValueInput<'a, Token = Token, Span = SimpleSpan>,
{
    recursive(|pipeline| {
        let chain = select! { Token::Chain(fields) => fields };

        let variable = select! { Token::Variable(name) => name }
            .then(chain.clone().or_not())
            .map(|(name, fields)| Arg::Variable {
                name,
                fields: fields.unwrap_or_default(),
            });

        // Terms that a field chain may be attached to
        let chainable = choice((
            pipeline
                .delimited_by(just(Token::LParen), just(Token::RParen))
                .map(Arg::Pipeline),
            select! { Token::Ident(name) => Arg::Identifier(name) },
        ))
        .map_with(|arg, e| Spanned::new(arg, span_range(&e.span())))
        .then(chain.or_not())
        .map(|(base, fields)| match fields {
            Some(fields) => Arg::Chain {
                base: Box::new(base),
                fields,
            },
            None => base.node,
        });

        let number = select! { Token::Number(text) => text }.try_map(|text, span| {
            match NumberKind::classify(&text) {
                Some(kind) => Ok(Arg::Number { text, kind }),
                None => Err(Rich::custom(span, format!("bad number syntax: {:?}", text))),
            }
        });

        let literal = select! {
            Token::Dot => Arg::Dot,
            Token::Nil => Arg::Nil,
            Token::Bool(b) => Arg::Bool(b),
            Token::String(s) => Arg::String(s),
            Token::Char(c) => Arg::Number { text: c, kind: NumberKind::Rune },
            Token::Field(fields) => Arg::Field(fields),
        };

        let operand = choice((variable, chainable, number, literal))
            .map_with(|arg, e| Spanned::new(arg, span_range(&e.span())));

        let command = operand
            .repeated()
            .at_least(1)
            .collect::<Vec<_>>()
            .map_with(|args, e| Spanned::new(Command { args }, span_range(&e.span())));

        let decl = select! { Token::Variable(name) => name }
            .map_with(|name, e| Spanned::new(name, span_range(&e.span())))
            .separated_by(just(Token::Comma))
            .at_least(1)
            .at_most(2)
            .collect::<Vec<_>>()
            .then(choice((
                just(Token::Declare).to(false),
                just(Token::Assign).to(true),
            )));

        decl.or_not()
            .then(
                command
                    .separated_by(just(Token::Pipe))
                    .at_least(1)
                    .collect::<Vec<_>>(),
            )
            .map(|(decl, commands)| {
                let (decl, is_assign) = decl.unwrap_or_default();
                Pipeline {
                    decl,
                    is_assign,
                    commands,
                }
            })
    })
}

fn template_parser<'a, I>() -> impl Parser<'a, I, Vec<Item>, extra::Err<Rich<'a, Token>>> + Clone
where
    I: ValueInput<'a, Token = Token, Span = SimpleSpan>,
{
    let pipeline = pipeline_parser();
    let open = just(Token::Open);
    let close = just(Token::Close);
    let end_action = open
        .clone()
        .then(just(Token::End))
        .then(close.clone())
        .ignored();

    let name = select! { Token::String(s) => s }
        .map_with(|s, e| Spanned::new(s, span_range(&e.span())));

    let node = recursive(|node| {
        let list = node.repeated().collect::<Vec<_>>();

        let else_list = open
            .clone()
            .then(just(Token::Else))
            .then(close.clone())
            .ignore_then(list.clone());

        let text = select! {
            Token::Text(s) => Node::Text(s),
            Token::Comment(c) => Node::Comment(c),
        };

        let action = open
            .clone()
            .ignore_then(pipeline.clone())
            .then_ignore(close.clone())
            .map(Node::Action);

        let break_node = open
            .clone()
            .then(just(Token::Break))
            .then(close.clone())
            .to(Node::Break);

        let continue_node = open
            .clone()
            .then(just(Token::Continue))
            .then(close.clone())
            .to(Node::Continue);

        let template_call = name
            .clone()
            .then(pipeline.clone().or_not())
            .map(|(name, pipe)| TemplateCall { name, pipe });

        let template = open
            .clone()
            .ignore_then(just(Token::Template))
            .ignore_then(template_call.clone())
            .then_ignore(close.clone())
            .map(Node::Template);

        let block = open
            .clone()
            .ignore_then(just(Token::Block))
            .ignore_then(template_call)
            .then_ignore(close.clone())
            .then(list.clone())
            .then_ignore(end_action.clone())
            .map(|(call, body)| Node::Block(call, body));

        // `{{else if ...}}` chains share the outer `{{end}}`
        let if_branch = recursive(|if_branch| {
            pipeline
                .clone()
                .then_ignore(close.clone())
                .then(list.clone())
                .then(
                    choice((
                        open.clone()
                            .then(just(Token::Else))
                            .then(just(Token::If))
                            .ignore_then(if_branch)
                            .map_with(|branch, e| {
                                vec![Spanned::new(Node::If(branch), span_range(&e.span()))]
                            }),
                        else_list.clone(),
                    ))
                    .or_not(),
                )
                .map(|((pipe, list), else_list)| Branch {
                    pipe,
                    list,
                    else_list,
                })
        });

        let with_branch = recursive(|with_branch| {
            pipeline
                .clone()
                .then_ignore(close.clone())
                .then(list.clone())
                .then(
                    choice((
                        open.clone()
                            .then(just(Token::Else))
                            .then(just(Token::With))
                            .ignore_then(with_branch)
                            .map_with(|branch, e| {
                                vec![Spanned::new(Node::With(branch), span_range(&e.span()))]
                            }),
                        else_list.clone(),
                    ))
                    .or_not(),
                )
                .map(|((pipe, list), else_list)| Branch {
                    pipe,
                    list,
                    else_list,
                })
        });

        let if_node = open
            .clone()
            .then(just(Token::If))
            .ignore_then(if_branch)
            .then_ignore(end_action.clone())
            .map(Node::If);

        let with_node = open
            .clone()
            .then(just(Token::With))
            .ignore_then(with_branch)
            .then_ignore(end_action.clone())
            .map(Node::With);

        let range_node = open
            .clone()
            .then(just(Token::Range))
            .ignore_then(pipeline.clone())
            .then_ignore(close.clone())
            .then(list.clone())
            .then(else_list.or_not())
            .then_ignore(end_action.clone())
            .map(|((pipe, list), else_list)| {
                Node::Range(Branch {
                    pipe,
                    list,
                    else_list,
                })
            });

        choice((
            text,
            if_node,
            with_node,
            range_node,
            block,
            template,
            break_node,
            continue_node,
            action,
        ))
        .map_with(|node, e| Spanned::new(node, span_range(&e.span())))
        .boxed()
    });

    let define = open
        .clone()
        .ignore_then(just(Token::Define))
        .ignore_then(name)
        .then_ignore(close)
        .then(node.clone().repeated().collect::<Vec<_>>())
        .then_ignore(end_action)
        .map(|(name, body)| Item::Define(name, body));

    choice((define, node.map(Item::Node)))
        .repeated()
        .collect::<Vec<_>>()
        .then_ignore(end())
}

/// Post-parse validation and `{{define}}`/`{{block}}` tree assembly
struct TreeAssembler<'f> {
    parse_name: String,
    text: Arc<str>,
    is_function: &'f dyn Fn(&str) -> bool,
    trees: Vec<Tree>,
    errors: Vec<ParseError>,
}

impl TreeAssembler<'_> {
    /// Add a tree; an empty tree never replaces a non-empty one
    fn add(&mut self, name: String, span: Span, root: Vec<Spanned<Node>>) {
        let tree = Tree {
            name,
            parse_name: self.parse_name.clone(),
            root,
            text: self.text.clone(),
            origin: Origin::Text,
        };
        match self.trees.iter_mut().find(|t| t.name == tree.name) {
            None => self.trees.push(tree),
            Some(existing) if existing.is_empty() => *existing = tree,
            Some(_) if tree.is_empty() => {}
            Some(_) => self.errors.push(ParseError::misplaced(
                span,
                format!("multiple definition of template {:?}", tree.name),
            )),
        }
    }

    fn visit_list(&mut self, list: &mut [Spanned<Node>], in_range: bool) {
        for node in list {
            self.visit_node(node, in_range);
        }
    }

    fn visit_node(&mut self, node: &mut Spanned<Node>, in_range: bool) {
        match &mut node.node {
            Node::Text(_) | Node::Comment(_) => {}
            Node::Action(pipe) => self.visit_pipeline(pipe, "command"),
            Node::If(branch) => self.visit_branch(branch, "if", in_range, in_range),
            Node::With(branch) => self.visit_branch(branch, "with", in_range, in_range),
            Node::Range(branch) => self.visit_branch(branch, "range", true, in_range),
            Node::Template(call) => {
                if let Some(pipe) = &mut call.pipe {
                    self.visit_pipeline(pipe, "template clause");
                }
            }
            Node::Block(call, body) => {
                if let Some(pipe) = &mut call.pipe {
                    self.visit_pipeline(pipe, "block clause");
                }
                let mut body = std::mem::take(body);
                self.visit_list(&mut body, false);
                let call = call.clone();
                self.add(call.name.node.clone(), call.name.span.clone(), body);
                node.node = Node::Template(call);
            }
            Node::Break => {
                if !in_range {
                    self.errors
                        .push(ParseError::misplaced(node.span.clone(), "{{break}} outside {{range}}"));
                }
            }
            Node::Continue => {
                if !in_range {
                    self.errors.push(ParseError::misplaced(
                        node.span.clone(),
                        "{{continue}} outside {{range}}",
                    ));
                }
            }
        }
    }

    fn visit_branch(&mut self, branch: &mut Branch, context: &str, body_in_range: bool, else_in_range: bool) {
        self.visit_pipeline(&mut branch.pipe, context);
        self.visit_list(&mut branch.list, body_in_range);
        if let Some(else_list) = &mut branch.else_list {
            self.visit_list(else_list, else_in_range);
        }
    }

    fn visit_pipeline(&mut self, pipe: &mut Pipeline, context: &str) {
        if pipe.decl.len() > 1 && context != "range" {
            self.errors.push(ParseError::misplaced(
                pipe.decl[1].span.clone(),
                format!("too many declarations in {}", context),
            ));
        }
        for command in &mut pipe.commands {
            for arg in &mut command.node.args {
                self.visit_arg(arg);
            }
        }
    }

    fn visit_arg(&mut self, arg: &mut Spanned<Arg>) {
        match &mut arg.node {
            Arg::Identifier(name) => {
                if !(self.is_function)(name) {
                    self.errors.push(ParseError::UndefinedFunction {
                        span: arg.span.clone(),
                        name: name.clone(),
                    });
                }
            }
            Arg::Pipeline(pipe) => self.visit_pipeline(pipe, "parenthesized pipeline"),
            Arg::Chain { base, .. } => self.visit_arg(base),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn known(name: &str) -> bool {
        matches!(name, "printf" | "len" | "index" | "eq" | "upper")
    }

    fn parse_one(text: &str) -> Tree {
        let mut trees = parse("t", text, &Delims::default(), &known).expect("Should parse");
        let index = trees.iter().position(|t| t.name == "t").expect("top tree");
        trees.swap_remove(index)
    }

    fn find<'t>(trees: &'t [Tree], name: &str) -> &'t Tree {
        trees.iter().find(|t| t.name == name).expect("tree present")
    }

    #[test]
    fn test_parse_text_and_field() {
        let tree = parse_one("Hello, {{.Name}}!");
        assert_eq!(tree.root.len(), 3);
        match &tree.root[1].node {
            Node::Action(pipe) => {
                assert_eq!(pipe.commands.len(), 1);
                assert_eq!(
                    pipe.commands[0].node.args[0].node,
                    Arg::Field(vec!["Name".to_string()])
                );
                assert_eq!(pipe.commands[0].node.args[0].span, 9..14);
            }
            other => panic!("Expected action, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_pipeline_and_call() {
        let tree = parse_one(r#"{{.Name | printf "%s: %d" .Age | upper}}"#);
        match &tree.root[0].node {
            Node::Action(pipe) => {
                assert_eq!(pipe.commands.len(), 3);
                assert_eq!(pipe.commands[1].node.args.len(), 3);
                assert_eq!(
                    pipe.commands[1].node.args[0].node,
                    Arg::Identifier("printf".to_string())
                );
            }
            other => panic!("Expected action, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_else_if_chain_shares_end() {
        let tree = parse_one("{{if .A}}a{{else if .B}}b{{else}}c{{end}}");
        match &tree.root[0].node {
            Node::If(branch) => {
                let else_list = branch.else_list.as_ref().expect("else branch");
                match &else_list[0].node {
                    Node::If(inner) => assert!(inner.else_list.is_some()),
                    other => panic!("Expected nested if, got {:?}", other),
                }
            }
            other => panic!("Expected if, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_else_with() {
        let tree = parse_one("{{with .A}}{{.}}{{else with .B}}{{.}}{{end}}");
        assert!(matches!(&tree.root[0].node, Node::With(b) if b.else_list.is_some()));
    }

    #[test]
    fn test_parse_range_declarations() {
        let tree = parse_one("{{range $i, $v := .Items}}{{$i}}{{$v.Name}}{{else}}none{{end}}");
        match &tree.root[0].node {
            Node::Range(branch) => {
                let names: Vec<_> = branch.pipe.decl.iter().map(|d| d.node.as_str()).collect();
                assert_eq!(names, vec!["$i", "$v"]);
                assert!(!branch.pipe.is_assign);
                assert_eq!(branch.list.len(), 2);
                assert!(branch.else_list.is_some());
            }
            other => panic!("Expected range, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_assignment() {
        let tree = parse_one("{{$x := 1}}{{$x = 2}}");
        match &tree.root[1].node {
            Node::Action(pipe) => assert!(pipe.is_assign),
            other => panic!("Expected action, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_chain_on_parenthesized_pipeline() {
        let tree = parse_one("{{(index .Items 0).Name}}");
        match &tree.root[0].node {
            Node::Action(pipe) => match &pipe.commands[0].node.args[0].node {
                Arg::Chain { base, fields } => {
                    assert!(matches!(base.node, Arg::Pipeline(_)));
                    assert_eq!(fields, &vec!["Name".to_string()]);
                }
                other => panic!("Expected chain, got {:?}", other),
            },
            other => panic!("Expected action, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_literals() {
        let tree = parse_one(r#"{{printf "%v %v %v %v %v" 1 2.5 'x' true nil}}"#);
        match &tree.root[0].node {
            Node::Action(pipe) => {
                let args = &pipe.commands[0].node.args;
                assert!(matches!(args[2].node, Arg::Number { kind: NumberKind::Int, .. }));
                assert!(matches!(args[3].node, Arg::Number { kind: NumberKind::Float, .. }));
                assert!(matches!(args[4].node, Arg::Number { kind: NumberKind::Rune, .. }));
                assert_eq!(args[5].node, Arg::Bool(true));
                assert_eq!(args[6].node, Arg::Nil);
            }
            other => panic!("Expected action, got {:?}", other),
        }
    }

    #[test]
    fn test_define_and_block_become_trees() {
        let trees = parse(
            "page",
            r#"{{define "header"}}<h1>{{.Title}}</h1>{{end}}{{block "body" .}}{{.Text}}{{end}}"#,
            &Delims::default(),
            &known,
        )
        .expect("Should parse");
        let names: Vec<_> = trees.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["header", "body", "page"]);
        let page = find(&trees, "page");
        match &page.root[0].node {
            Node::Template(call) => assert_eq!(call.name.node, "body"),
            other => panic!("Expected template call, got {:?}", other),
        }
        assert_eq!(find(&trees, "header").parse_name, "page");
    }

    #[test]
    fn test_empty_define_does_not_replace() {
        let trees = parse(
            "t",
            r#"{{define "a"}}x{{end}}{{define "a"}} {{end}}"#,
            &Delims::default(),
            &known,
        )
        .expect("Should parse");
        assert!(!find(&trees, "a").is_empty());
    }

    #[test]
    fn test_duplicate_definition_is_an_error() {
        let errors = parse(
            "t",
            r#"{{define "a"}}x{{end}}{{define "a"}}y{{end}}"#,
            &Delims::default(),
            &known,
        )
        .unwrap_err();
        assert!(errors[0].to_string().contains("multiple definition"));
    }

    #[test]
    fn test_break_outside_range() {
        let errors = parse("t", "{{if .}}{{break}}{{end}}", &Delims::default(), &known).unwrap_err();
        assert_eq!(errors[0].to_string(), "{{break}} outside {{range}}");

        assert!(parse("t", "{{range .}}{{if .}}{{continue}}{{end}}{{end}}", &Delims::default(), &known).is_ok());
        assert!(parse("t", "{{range .}}{{else}}{{break}}{{end}}", &Delims::default(), &known).is_err());
    }

    #[test]
    fn test_undefined_function() {
        let errors = parse("t", "{{shout .Name}}", &Delims::default(), &known).unwrap_err();
        assert_eq!(errors[0].to_string(), r#"function "shout" not defined"#);
    }

    #[test]
    fn test_two_declarations_only_in_range() {
        let errors = parse("t", "{{with $a, $b := .}}{{end}}", &Delims::default(), &known).unwrap_err();
        assert_eq!(errors[0].to_string(), "too many declarations in with");
    }

    #[test]
    fn test_syntax_errors() {
        assert!(parse("t", "{{if .A}}unterminated", &Delims::default(), &known).is_err());
        assert!(parse("t", "{{end}}", &Delims::default(), &known).is_err());
        assert!(parse("t", "{{.A | }}", &Delims::default(), &known).is_err());
    }
}
