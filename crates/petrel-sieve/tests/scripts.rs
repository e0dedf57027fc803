//! Whole-script tests for the Sieve front end.
//!
//! These drive the public API only: feed a script in, look at the
//! diagnostics, the extension sets, and the analysed tree.

use petrel_sieve::{Argument, Command, Script};

/// Collects every argument in the tree, depth first.
fn all_arguments(commands: &[Command]) -> Vec<&Argument> {
    fn from_command<'a>(command: &'a Command, out: &mut Vec<&'a Argument>) {
        out.extend(command.arguments().arguments());
        for test in command.arguments().tests() {
            from_test(test, out);
        }
        if let Some(block) = command.block() {
            for child in block.commands() {
                from_command(child, out);
            }
        }
    }
    fn from_test<'a>(test: &'a petrel_sieve::Test, out: &mut Vec<&'a Argument>) {
        out.extend(test.arguments().arguments());
        for sub in test.arguments().tests() {
            from_test(sub, out);
        }
    }
    let mut out = Vec::new();
    for command in commands {
        from_command(command, &mut out);
    }
    out
}

fn error_messages(script: &Script) -> Vec<&str> {
    script.errors().iter().map(|e| e.message.as_str()).collect()
}

#[test]
fn test_filing_script_is_clean() {
    let script = Script::parse(
        "require [\"fileinto\"]; \
         if header :contains \"subject\" \"foo\" { fileinto \"Junk\"; }",
    );
    assert!(script.ok(), "{:?}", script.errors());
    assert_eq!(script.declared_extensions(), ["fileinto"]);
    assert_eq!(
        script.needed_extensions(),
        ["comparator-i;ascii-casemap", "fileinto"]
    );
}

#[test]
fn test_anyof_script_is_clean() {
    let script = Script::parse("if anyof (header :is \"x\" \"y\") { keep; }");
    assert!(script.ok(), "{:?}", script.errors());
}

#[test]
fn test_fileinto_without_require() {
    let script = Script::parse("fileinto \"Junk\";");
    assert_eq!(script.errors().len(), 1);
    assert_eq!(script.errors()[0].message, "Missing require: \"fileinto\"");
    assert_eq!(script.errors()[0].start, 0);
}

#[test]
fn test_cyrus_mailbox_syntax_is_diagnosed() {
    let script = Script::parse("require [\"fileinto\"]; fileinto \"INBOX.Junk\";");
    assert_eq!(script.errors().len(), 1);
    assert_eq!(
        script.errors()[0].message,
        "\"INBOX.Junk\" is Cyrus syntax. Archiveopteryx uses \"Junk\""
    );
}

#[test]
fn test_cyrus_mailbox_nested() {
    let script = Script::parse("require [\"fileinto\"]; fileinto \"INBOX.lists.rust\";");
    assert_eq!(
        script.errors()[0].message,
        "\"INBOX.lists.rust\" is Cyrus syntax. Archiveopteryx uses \"lists/rust\""
    );
}

#[test]
fn test_vacation_days_out_of_range() {
    let script = Script::parse("require [\"vacation\"]; vacation :days 400 \"Out\";");
    assert_eq!(script.errors().len(), 1);
    assert_eq!(script.errors()[0].message, "Number must be 1..365");
}

#[test]
fn test_mutually_exclusive_match_types() {
    let script = Script::parse("if header :is :contains \"x\" \"y\" { keep; }");
    let messages = error_messages(&script);
    assert_eq!(
        messages,
        ["Mutually exclusive tags used", "Tag :is conflicts with :contains"]
    );
}

#[test]
fn test_failed_ihave_suppresses_errors() {
    let script = Script::parse(
        "require [\"ihave\"]; \
         if ihave [\"nosuchext\"] { weirdcommand; } else { keep; }",
    );
    assert!(script.ok(), "{:?}", script.errors());
}

#[test]
fn test_else_at_top_level() {
    let script = Script::parse("else { keep; }");
    assert_eq!(script.errors().len(), 1);
    assert_eq!(
        script.errors()[0].message,
        "else is only permitted after if/elsif"
    );
}

#[test]
fn test_passing_ihave_acts_like_require() {
    let script = Script::parse(
        "require [\"ihave\"]; \
         if ihave [\"fileinto\"] { fileinto \"Junk\"; } else { keep; }",
    );
    assert!(script.ok(), "{:?}", script.errors());
}

#[test]
fn test_ihave_scope_does_not_leak() {
    // fileinto is only legal inside the branch the ihave guards
    let script = Script::parse(
        "require [\"ihave\"]; \
         if ihave [\"fileinto\"] { keep; } \
         fileinto \"Junk\";",
    );
    assert_eq!(error_messages(&script), ["Missing require: \"fileinto\""]);
}

#[test]
fn test_ihave_itself_must_be_required() {
    let script = Script::parse("if ihave [\"fileinto\"] { fileinto \"Junk\"; } else { keep; }");
    assert!(error_messages(&script).contains(&"Missing require: \"ihave\""));
}

#[test]
fn test_every_argument_is_parsed_in_clean_scripts() {
    let sources = [
        "require [\"fileinto\"]; if header :contains \"subject\" \"foo\" { fileinto \"Junk\"; }",
        "if anyof (header :is \"x\" \"y\", size :over 100K, exists [\"to\", \"cc\"]) { keep; }",
        "require [\"vacation\"]; vacation :days 30 :subject \"Away\" \"I am away.\";",
        "require [\"body\", \"relational\"]; \
         if allof (body :raw :contains \"x\", header :count \"GT\" \"received\" \"3\") \
         { discard; } else { keep; }",
    ];
    for source in sources {
        let script = Script::parse(source);
        assert!(script.ok(), "{source}: {:?}", script.errors());
        for argument in all_arguments(script.commands()) {
            assert!(argument.is_parsed(), "unparsed argument in {source}");
        }
    }
}

#[test]
fn test_needed_extensions_are_declared_in_clean_scripts() {
    let implicit = ["comparator-i;octet", "comparator-i;ascii-casemap"];
    let sources = [
        "require [\"fileinto\", \"copy\"]; fileinto :copy \"Junk\";",
        "require [\"envelope\", \"subaddress\"]; \
         if envelope :detail :is \"to\" \"extra\" { keep; }",
        "require [\"date\", \"relational\"]; \
         if currentdate :value \"GE\" \"hour\" [\"09\"] { keep; }",
    ];
    for source in sources {
        let script = Script::parse(source);
        assert!(script.ok(), "{source}: {:?}", script.errors());
        let declared = script.declared_extensions();
        for needed in script.needed_extensions() {
            assert!(
                declared.contains(&needed) || implicit.contains(&needed.as_str()),
                "{source}: {needed} needed but not declared"
            );
        }
    }
}

#[test]
fn test_all_problems_reported_in_one_pass() {
    let script = Script::parse(
        "fileinto \"Junk\";\n\
         vacation :days 999 \"x\";\n\
         frobnicate;\n",
    );
    let messages = error_messages(&script);
    assert!(messages.contains(&"Missing require: \"fileinto\""));
    assert!(messages.contains(&"Missing require: \"vacation\""));
    assert!(messages.contains(&"Number must be 1..365"));
    assert!(messages.contains(&"Command unknown: frobnicate"));
}

#[test]
fn test_errors_are_sorted_by_offset() {
    let script = Script::parse(
        "fileinto \"Junk\";\n\
         redirect \"not an address\";\n\
         frobnicate;\n",
    );
    let offsets: Vec<_> = script.errors().iter().map(|e| e.start).collect();
    let mut sorted = offsets.clone();
    sorted.sort_unstable();
    assert_eq!(offsets, sorted);
    assert!(script.errors().len() >= 3);
}

#[test]
fn test_parsing_is_deterministic() {
    let source = "require [\"vacation\"];\n\
                  vacation :days 400 :days 3 \"Out\";\n\
                  if header :is :contains \"x\" \"y\" { weird; }\n";
    let first = Script::parse(source);
    let second = Script::parse(source);
    assert_eq!(first.errors(), second.errors());
    assert_eq!(first.needed_extensions(), second.needed_extensions());
}

#[test]
fn test_broken_script_still_returns_tree() {
    let script = Script::parse(
        "require [\"fileinto\"];\n\
         if header { fileinto \"Junk\"\n\
         keep;",
    );
    assert!(!script.ok());
    // the require and the if survived as commands
    assert_eq!(script.commands().len(), 2);
    assert_eq!(script.commands()[0].identifier(), "require");
    assert_eq!(script.commands()[1].identifier(), "if");
}

#[test]
fn test_kitchen_sink_script_is_clean() {
    let script = Script::parse(
        "# weekly triage\n\
         require [\"fileinto\", \"copy\", \"reject\", \"vacation\", \"body\",\n\
                  \"relational\", \"comparator-i;ascii-numeric\", \"imap4flags\",\n\
                  \"envelope\", \"subaddress\", \"date\"];\n\
         if anyof (envelope :localpart :is \"from\" \"noreply\",\n\
                   header :contains [\"list-id\", \"list-post\"] \"announce\") {\n\
             fileinto :copy \"lists\";\n\
             addflag [\"\\\\Seen\"];\n\
             stop;\n\
         } elsif allof (size :over 5M,\n\
                        not body :text :contains \"invoice\") {\n\
             reject \"Too large.\";\n\
         } elsif header :comparator \"i;ascii-numeric\" :value \"ge\" \"x-priority\" \"3\" {\n\
             keep;\n\
         } else {\n\
             discard;\n\
         }\n",
    );
    assert!(script.ok(), "{:?}", script.errors());
    // require, if, two elsifs, else
    assert_eq!(script.commands().len(), 5);
}

#[test]
fn test_empty_script_is_clean() {
    let script = Script::parse("");
    assert!(script.ok());
    assert!(script.commands().is_empty());
    assert!(script.declared_extensions().is_empty());
    assert!(script.needed_extensions().is_empty());
}

#[test]
fn test_error_spans_point_into_source() {
    let source = "require [\"vacation\"]; vacation :days 400 \"Out\";";
    let script = Script::parse(source);
    let error = &script.errors()[0];
    assert!(error.start < error.end);
    assert!(error.end <= source.len());
    assert_eq!(&source[error.start..error.end], "400");
}
