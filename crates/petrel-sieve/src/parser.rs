//! Generic Sieve parser.
//!
//! This is the first of the two passes: it drives the lexer through the
//! RFC 5228 section 8 grammar and builds the production tree, with no
//! knowledge of what any command or test means. On a syntax error it
//! records the error on the current production and resynchronises at the
//! next `;` at the current block depth, or at the matching `}`, so parsing
//! always yields a complete script.

use crate::ast::{Argument, ArgumentList, ArgumentValue, Block, Command, NodeId, Nodes, Test};
use crate::lexer::{Lexer, SpannedToken, Token};

/// Parses `source` into the node registry, returning the root id and the
/// top-level commands.
pub(crate) fn parse(source: &str, nodes: &mut Nodes) -> (NodeId, Vec<Command>) {
    let root = nodes.add("script", None);
    nodes.set_span(root, 0, source.len());
    let mut parser = Parser {
        lexer: Lexer::new(source),
        peeked: None,
        last_end: 0,
        nodes,
    };
    let commands = parser.parse_commands(root, false);
    (root, commands)
}

struct Parser<'a, 'n> {
    lexer: Lexer<'a>,
    peeked: Option<SpannedToken>,
    last_end: usize,
    nodes: &'n mut Nodes,
}

impl Parser<'_, '_> {
    fn peek(&mut self) -> &SpannedToken {
        let lexer = &mut self.lexer;
        self.peeked.get_or_insert_with(|| lexer.next_token())
    }

    fn bump(&mut self) -> SpannedToken {
        let token = match self.peeked.take() {
            Some(t) => t,
            None => self.lexer.next_token(),
        };
        if token.token != Token::Eof {
            self.last_end = token.end;
        }
        token
    }

    fn parse_commands(&mut self, parent: NodeId, in_block: bool) -> Vec<Command> {
        let mut commands = Vec::new();
        loop {
            match self.peek().token.clone() {
                Token::Eof => break,
                Token::RightBrace if in_block => break,
                Token::RightBrace => {
                    let t = self.bump();
                    let id = self.nodes.add("command", Some(parent));
                    self.nodes.set_span(id, t.start, t.end);
                    self.nodes.set_error(id, "Unexpected '}'");
                }
                _ => commands.push(self.parse_command(parent)),
            }
        }
        commands
    }

    fn parse_command(&mut self, parent: NodeId) -> Command {
        let start = self.peek().start;
        let node = self.nodes.add("command", Some(parent));
        self.nodes.set_start(node, start);

        let identifier = match self.peek().token.clone() {
            Token::Identifier(name) => {
                self.bump();
                name.to_ascii_lowercase()
            }
            Token::Error(message) => {
                self.bump();
                self.nodes.set_error(node, message);
                self.resync();
                return self.broken_command(node);
            }
            other => {
                self.bump();
                self.nodes
                    .set_error(node, format!("Expected a command name, but got: {other}"));
                self.resync();
                return self.broken_command(node);
            }
        };

        let arguments = self.parse_arguments(node);

        let mut block = None;
        match self.peek().token.clone() {
            Token::Semicolon => {
                self.bump();
            }
            Token::LeftBrace => {
                block = Some(self.parse_block(node));
            }
            other => {
                let message = format!("Expected ';' or '{{', but got: {other}");
                self.nodes.set_error(node, message);
                self.resync();
            }
        }

        self.nodes.set_end(node, self.last_end.max(start));
        Command {
            node,
            identifier,
            arguments,
            block,
        }
    }

    /// Command shell for an unparsable statement: no name, no arguments.
    fn broken_command(&mut self, node: NodeId) -> Command {
        self.nodes.set_end(node, self.last_end);
        let args_node = self.nodes.add("arguments", Some(node));
        self.nodes.set_span(args_node, self.last_end, self.last_end);
        Command {
            node,
            identifier: String::new(),
            arguments: ArgumentList::new(args_node),
            block: None,
        }
    }

    fn parse_block(&mut self, command: NodeId) -> Block {
        let open = self.bump();
        let node = self.nodes.add("block", Some(command));
        self.nodes.set_start(node, open.start);

        let commands = self.parse_commands(node, true);

        if self.peek().token == Token::RightBrace {
            self.bump();
        } else {
            self.nodes.set_error(node, "Expected '}'");
        }
        self.nodes.set_end(node, self.last_end);
        Block { node, commands }
    }

    fn parse_arguments(&mut self, parent: NodeId) -> ArgumentList {
        let start = self.peek().start;
        let node = self.nodes.add("arguments", Some(parent));
        self.nodes.set_start(node, start);
        let mut list = ArgumentList::new(node);

        loop {
            match self.peek().token.clone() {
                Token::String(s) => {
                    let t = self.bump();
                    self.push_argument(&mut list, ArgumentValue::StringList(vec![s]), t.start);
                }
                Token::LeftBracket => {
                    self.parse_bracket_list(&mut list);
                }
                Token::Number(n) => {
                    let t = self.bump();
                    self.push_argument(&mut list, ArgumentValue::Number(n), t.start);
                }
                Token::Tag(tag) => {
                    let t = self.bump();
                    self.push_argument(
                        &mut list,
                        ArgumentValue::Tag(tag.to_ascii_lowercase()),
                        t.start,
                    );
                }
                Token::Error(message) => {
                    let t = self.bump();
                    let id = self.nodes.add("argument", Some(node));
                    self.nodes.set_span(id, t.start, t.end);
                    self.nodes.set_error(id, message);
                }
                Token::Identifier(_) => {
                    let test = self.parse_test(node);
                    list.tests.push(test);
                    break;
                }
                Token::LeftParen => {
                    self.parse_test_list(&mut list);
                    break;
                }
                _ => break,
            }
        }

        self.nodes.set_end(node, self.last_end.max(start));
        list
    }

    fn push_argument(&mut self, list: &mut ArgumentList, value: ArgumentValue, start: usize) {
        let node = self.nodes.add("argument", Some(list.node));
        self.nodes.set_span(node, start, self.last_end);
        list.arguments.push(Argument {
            node,
            value,
            parsed: false,
        });
    }

    fn parse_bracket_list(&mut self, list: &mut ArgumentList) {
        let open = self.bump();
        let node = self.nodes.add("argument", Some(list.node));
        self.nodes.set_start(node, open.start);

        let mut strings = Vec::new();
        loop {
            match self.peek().token.clone() {
                Token::String(s) => {
                    self.bump();
                    strings.push(s);
                    match self.peek().token.clone() {
                        Token::Comma => {
                            self.bump();
                        }
                        Token::RightBracket => {
                            self.bump();
                            break;
                        }
                        other => {
                            let message = format!("Expected ',' or ']', but got: {other}");
                            self.nodes.set_error(node, message);
                            break;
                        }
                    }
                }
                Token::Error(message) => {
                    self.bump();
                    self.nodes.set_error(node, message);
                }
                Token::RightBracket => {
                    self.bump();
                    self.nodes.set_error(node, "Expected a string, but got: ']'");
                    break;
                }
                other => {
                    self.nodes
                        .set_error(node, format!("Expected a string, but got: {other}"));
                    break;
                }
            }
        }

        self.nodes.set_end(node, self.last_end);
        list.arguments.push(Argument {
            node,
            value: ArgumentValue::StringList(strings),
            parsed: false,
        });
    }

    fn parse_test(&mut self, parent: NodeId) -> Test {
        let t = self.bump();
        let node = self.nodes.add("test", Some(parent));
        self.nodes.set_start(node, t.start);
        let identifier = match t.token {
            Token::Identifier(name) => name.to_ascii_lowercase(),
            _ => String::new(),
        };
        let arguments = self.parse_arguments(node);
        self.nodes.set_end(node, self.last_end);
        Test::new(node, identifier, arguments)
    }

    fn parse_test_list(&mut self, list: &mut ArgumentList) {
        self.bump();
        loop {
            match self.peek().token.clone() {
                Token::Identifier(_) => {
                    let test = self.parse_test(list.node);
                    list.tests.push(test);
                    match self.peek().token.clone() {
                        Token::Comma => {
                            self.bump();
                        }
                        Token::RightParen => {
                            self.bump();
                            break;
                        }
                        other => {
                            let message = format!("Expected ',' or ')', but got: {other}");
                            self.nodes.set_error(list.node, message);
                            break;
                        }
                    }
                }
                Token::Error(message) => {
                    let t = self.bump();
                    let id = self.nodes.add("test", Some(list.node));
                    self.nodes.set_span(id, t.start, t.end);
                    self.nodes.set_error(id, message);
                }
                Token::RightParen => {
                    self.bump();
                    self.nodes
                        .set_error(list.node, "Expected a test name, but got: ')'");
                    break;
                }
                other => {
                    self.nodes
                        .set_error(list.node, format!("Expected a test name, but got: {other}"));
                    break;
                }
            }
        }
    }

    /// Skips ahead to the next `;` at the current depth, or to the `}`
    /// closing the current block, whichever comes first.
    fn resync(&mut self) {
        let mut depth = 0usize;
        loop {
            match self.peek().token.clone() {
                Token::Eof => break,
                Token::Semicolon if depth == 0 => {
                    self.bump();
                    break;
                }
                Token::LeftBrace => {
                    depth += 1;
                    self.bump();
                }
                Token::RightBrace => {
                    if depth == 0 {
                        break;
                    }
                    depth -= 1;
                    self.bump();
                }
                _ => {
                    self.bump();
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    fn parsed(source: &str) -> (Nodes, Vec<Command>) {
        let mut nodes = Nodes::default();
        let (_, commands) = parse(source, &mut nodes);
        (nodes, commands)
    }

    #[test]
    fn test_simple_command() {
        let (nodes, commands) = parsed("keep;");
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].identifier, "keep");
        assert!(commands[0].block.is_none());
        assert!(nodes.collect_errors().is_empty());
    }

    #[test]
    fn test_identifier_lowercased() {
        let (_, commands) = parsed("KEEP;");
        assert_eq!(commands[0].identifier, "keep");
    }

    #[test]
    fn test_arguments_in_source_order() {
        let (_, commands) = parsed("fileinto :copy \"Junk\";");
        let args = &commands[0].arguments;
        assert_eq!(args.arguments.len(), 2);
        assert_eq!(args.arguments[0].value, ArgumentValue::Tag(":copy".into()));
        assert_eq!(
            args.arguments[1].value,
            ArgumentValue::StringList(vec!["Junk".into()])
        );
    }

    #[test]
    fn test_tag_lowercased() {
        let (_, commands) = parsed("size :OVER 2K;");
        let args = &commands[0].arguments;
        assert_eq!(args.arguments[0].value, ArgumentValue::Tag(":over".into()));
        assert_eq!(args.arguments[1].value, ArgumentValue::Number(2048));
    }

    #[test]
    fn test_bracketed_string_list() {
        let (nodes, commands) = parsed("require [\"a\", \"b\", \"c\"];");
        let args = &commands[0].arguments;
        assert_eq!(
            args.arguments[0].value,
            ArgumentValue::StringList(vec!["a".into(), "b".into(), "c".into()])
        );
        assert!(nodes.collect_errors().is_empty());
    }

    #[test]
    fn test_command_with_test_and_block() {
        let (nodes, commands) = parsed("if header :is \"x\" \"y\" { keep; stop; }");
        let cmd = &commands[0];
        assert_eq!(cmd.identifier, "if");
        assert_eq!(cmd.arguments.tests.len(), 1);
        let test = &cmd.arguments.tests[0];
        assert_eq!(test.identifier, "header");
        assert_eq!(test.arguments.arguments.len(), 3);
        let block = cmd.block.as_ref().unwrap();
        assert_eq!(block.commands.len(), 2);
        assert!(nodes.collect_errors().is_empty());
    }

    #[test]
    fn test_test_list() {
        let (nodes, commands) = parsed("if anyof (true, false, exists \"x\") { keep; }");
        let tests = &commands[0].arguments.tests;
        assert_eq!(tests.len(), 1);
        let subs = &tests[0].arguments.tests;
        assert_eq!(subs.len(), 3);
        assert_eq!(subs[0].identifier, "true");
        assert_eq!(subs[2].identifier, "exists");
        assert!(nodes.collect_errors().is_empty());
    }

    #[test]
    fn test_missing_semicolon_at_eof() {
        let (nodes, commands) = parsed("keep");
        assert_eq!(commands.len(), 1);
        let errors = nodes.collect_errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors[0].message,
            "Expected ';' or '{', but got: end of script"
        );
    }

    #[test]
    fn test_statement_without_semicolon_swallows_next_as_test() {
        // Grammatically "stop" can only be a test of "keep" here; the
        // semantic pass is what rejects it.
        let (nodes, commands) = parsed("keep\nstop;");
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].arguments.tests.len(), 1);
        assert!(nodes.collect_errors().is_empty());
    }

    #[test]
    fn test_bad_statement_resyncs_to_next_command() {
        let (nodes, commands) = parsed("fileinto 3 ] ;\nkeep;");
        assert_eq!(commands.len(), 2);
        assert_eq!(commands[1].identifier, "keep");
        assert!(!nodes.collect_errors().is_empty());
    }

    #[test]
    fn test_stray_close_brace() {
        let (nodes, commands) = parsed("} keep;");
        assert_eq!(commands.len(), 1);
        let errors = nodes.collect_errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "Unexpected '}'");
    }

    #[test]
    fn test_unclosed_block() {
        let (nodes, _) = parsed("if true { keep;");
        let errors = nodes.collect_errors();
        assert!(errors.iter().any(|e| e.message == "Expected '}'"));
    }

    #[test]
    fn test_lexer_error_becomes_argument_error() {
        let (nodes, commands) = parsed("vacation :days 999999999G \"x\";");
        assert_eq!(commands.len(), 1);
        let errors = nodes.collect_errors();
        assert!(errors.iter().any(|e| e.message == "Number too large"));
    }

    #[test]
    fn test_spans_nest_and_siblings_are_ordered() {
        let src = "require [\"fileinto\"];\nif anyof (header :contains [\"to\", \"cc\"] \"x\", size :over 100K) {\n  fileinto \"Junk\";\n}\nkeep;";
        let (nodes, _) = parsed(src);
        assert!(nodes.collect_errors().is_empty());

        // Every child's range lies within its parent's.
        for id in nodes.ids().collect::<Vec<_>>() {
            let (start, end) = nodes.span(id);
            assert!(start <= end, "span inverted on {:?}", nodes.kind(id));
            if let Some(parent) = nodes.parent(id) {
                let (pstart, pend) = nodes.span(parent);
                assert!(
                    pstart <= start && end <= pend,
                    "{:?} [{start},{end}) outside {:?} [{pstart},{pend})",
                    nodes.kind(id),
                    nodes.kind(parent)
                );
            }
        }

        // Siblings are disjoint and in source order.
        let ids: Vec<_> = nodes.ids().collect();
        for parent in &ids {
            let mut children: Vec<_> = ids
                .iter()
                .filter(|id| nodes.parent(**id) == Some(*parent))
                .map(|id| nodes.span(*id))
                .collect();
            children.sort_unstable();
            for pair in children.windows(2) {
                assert!(
                    pair[0].1 <= pair[1].0,
                    "overlapping siblings under {:?}",
                    nodes.kind(*parent)
                );
            }
        }
    }

    #[test]
    fn test_multiline_string_argument() {
        let (nodes, commands) = parsed("vacation text:\nGone fishing.\n.\n;");
        let args = &commands[0].arguments;
        assert_eq!(
            args.arguments[0].value,
            ArgumentValue::StringList(vec!["Gone fishing.\n".into()])
        );
        assert!(nodes.collect_errors().is_empty());
    }

    #[test]
    fn test_empty_script() {
        let (nodes, commands) = parsed("");
        assert!(commands.is_empty());
        assert!(nodes.collect_errors().is_empty());
    }

    #[test]
    fn test_comment_only_script() {
        let (nodes, commands) = parsed("# nothing here\n/* at all */\n");
        assert!(commands.is_empty());
        assert!(nodes.collect_errors().is_empty());
    }
}
