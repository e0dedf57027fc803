//! Semantic analysis.
//!
//! The second pass over the production tree. The generic parser knows the
//! grammar; this pass knows what every command and test means: which tagged
//! arguments it takes, which tags exclude each other, which arguments are
//! positional, what needs validating through the mail-model crates, and
//! which extension every construct depends on.
//!
//! Errors never unwind. They are recorded on the offending production and
//! collected after the walk, so a script with ten problems reports all ten.

use crate::ast::{
    AddressPart, Argument, ArgumentList, ArgumentValue, BodyMatch, Command, MatchType, Nodes,
    Relational, Test,
};
use crate::extensions::is_supported;
use crate::notify::NotifyMethod;
use petrel_mail::{mailbox, Address, Collation};
use petrel_mime::{entity_body, header_cased, Bodypart, FieldKind, Header};
use tracing::trace;

/// Analyses the top-level commands of a script.
///
/// The first command is the only place `require` may appear; each command
/// also learns its previous sibling's identifier so `elsif`/`else`
/// ordering can be checked.
pub(crate) fn analyze(commands: &mut [Command], nodes: &mut Nodes) {
    let mut previous = String::new();
    for (index, command) in commands.iter_mut().enumerate() {
        analyze_command(command, nodes, &previous, index == 0);
        previous.clone_from(&command.identifier);
    }
}

fn analyze_command(
    command: &mut Command,
    nodes: &mut Nodes,
    previous: &str,
    require_permitted: bool,
) {
    trace!(identifier = %command.identifier, "analysing command");

    if command.identifier.is_empty() {
        nodes.set_error(command.node, "Command name is empty");
    }

    let mut wants_test = false;
    let mut wants_block = false;

    match command.identifier.as_str() {
        "if" | "elsif" => {
            wants_test = true;
            wants_block = true;
            if command.identifier == "elsif" && previous != "if" && previous != "elsif" {
                nodes.set_error(command.node, "elsif is only permitted after if/elsif");
            }
        }
        "else" => {
            wants_block = true;
            if previous != "if" && previous != "elsif" {
                nodes.set_error(command.node, "else is only permitted after if/elsif");
            }
        }
        "require" => {
            command.arguments.number_remaining_arguments();
            let mut accepted = Vec::new();
            let mut unknown = Vec::new();
            if let Some(names) = command.arguments.take_string_list(nodes, 1) {
                for name in names {
                    if is_supported(&name) {
                        accepted.push(name);
                    } else {
                        unknown.push(format!("\"{name}\""));
                    }
                }
            }
            if !unknown.is_empty() {
                nodes.set_error(
                    command.node,
                    format!(
                        "Each string must be a supported sieve extension. \
                         These are not: {}",
                        unknown.join(", ")
                    ),
                );
            }
            if !require_permitted {
                nodes.set_error(command.node, "require is only permitted as the first command.");
            } else if let Some(parent) = nodes.parent(command.node) {
                nodes.add_extensions(parent, &accepted);
            }
        }
        "stop" | "keep" | "discard" => {
            // nothing needed
        }
        "reject" => {
            nodes.require(command.node, "reject");
            // reject without a reason is fine; with one, it must be a string
            if !command.arguments.arguments.is_empty() {
                command.arguments.number_remaining_arguments();
                command.arguments.take_string(nodes, 1);
            }
        }
        "ereject" => {
            nodes.require(command.node, "ereject");
            command.arguments.number_remaining_arguments();
            command.arguments.take_string(nodes, 1);
        }
        "fileinto" => {
            nodes.require(command.node, "fileinto");
            if command.arguments.find_tag(nodes, ":copy").is_some() {
                nodes.require(command.node, "copy");
            }
            if command.arguments.find_tag(nodes, ":flags").is_some() {
                nodes.require(command.node, "imap4flags");
                command.arguments.take_tagged_string_list(nodes, ":flags");
            }
            command.arguments.number_remaining_arguments();
            if let Some(name) = command.arguments.take_string(nodes, 1) {
                let rooted = format!("/{name}");
                if !mailbox::valid_name(&name) && !mailbox::valid_name(&rooted) {
                    nodes.set_error(
                        command.node,
                        format!("Expected mailbox name, but got: {name}"),
                    );
                } else if let Some(rest) = name.strip_prefix("INBOX.") {
                    // Scripts written for Cyrus spell mailboxes INBOX.X;
                    // here the user's mailboxes live directly under the
                    // account root.
                    let ours = rest.split('.').collect::<Vec<_>>().join("/");
                    nodes.set_error(
                        command.node,
                        format!(
                            "\"{name}\" is Cyrus syntax. Archiveopteryx uses \"{ours}\""
                        ),
                    );
                }
            }
        }
        "redirect" => {
            command.arguments.find_tag(nodes, ":copy");
            command.arguments.number_remaining_arguments();
            if let Some(target) = command.arguments.take_string(nodes, 1) {
                if Address::parse_single(&target).is_err() {
                    nodes.set_error(
                        command.node,
                        format!(
                            "Expected one normal address (local@domain), but got: {target}"
                        ),
                    );
                }
            }
        }
        "vacation" => analyze_vacation(command, nodes),
        "setflag" | "addflag" | "removeflag" => {
            nodes.require(command.node, "imap4flags");
            command.arguments.number_remaining_arguments();
            command.arguments.take_string_list(nodes, 1);
        }
        "notify" => analyze_notify(command, nodes),
        _ => {
            nodes.set_error(
                command.node,
                format!("Command unknown: {}", command.identifier),
            );
        }
    }

    command.arguments.flag_unparsed_as_bad(nodes);

    if wants_test {
        if command.arguments.tests.len() != 1 {
            nodes.set_error(
                command.node,
                format!("Command {} requires one test", command.identifier),
            );
        }
        for test in &mut command.arguments.tests {
            analyze_test(test, nodes);
            if wants_block {
                if let Some(block) = &command.block {
                    // A failed ihave makes the whole branch tolerant of
                    // unknown extensions; a passed one makes its names
                    // legal inside the branch.
                    if nodes.ihave_failed(test.node) {
                        nodes.set_ihave_failed(block.node);
                    } else {
                        let added = nodes.extensions_at(test.node).to_vec();
                        nodes.add_extensions(block.node, &added);
                    }
                }
            }
        }
    } else {
        for test in &command.arguments.tests {
            nodes.set_error(
                test.node,
                format!("Command {} does not use tests", command.identifier),
            );
        }
    }

    if wants_block {
        match command.block.as_mut() {
            Some(block) => {
                let mut previous = String::new();
                for child in &mut block.commands {
                    analyze_command(child, nodes, &previous, false);
                    previous.clone_from(&child.identifier);
                }
            }
            None => {
                nodes.set_error(
                    command.node,
                    format!(
                        "Command {} requires a subsidiary {{..}} block",
                        command.identifier
                    ),
                );
            }
        }
    } else if let Some(block) = &command.block {
        nodes.set_error(
            block.node,
            format!(
                "Command {} does not use a subsidiary command block",
                command.identifier
            ),
        );
        // no point checking the block's contents
    }
}

fn analyze_vacation(command: &mut Command, nodes: &mut Nodes) {
    // vacation [":days" number] [":subject" string]
    //          [":from" string] [":addresses" string-list]
    //          [":mime"] [":handle" string] <reason: string>
    nodes.require(command.node, "vacation");

    let mut days = 7;
    if command.arguments.find_tag(nodes, ":days").is_some() {
        days = command
            .arguments
            .take_tagged_number(nodes, ":days")
            .unwrap_or(0);
    }
    if !(1..=365).contains(&days) {
        command
            .arguments
            .tag_error(nodes, ":days", "Number must be 1..365");
    }

    // any subject is acceptable
    command.arguments.take_tagged_string(nodes, ":subject");

    if command.arguments.find_tag(nodes, ":from").is_some() {
        if let Some(from) = command.arguments.take_tagged_string(nodes, ":from") {
            parse_as_address(&mut command.arguments, nodes, &from, ":from");
        }
    }

    if command.arguments.find_tag(nodes, ":addresses").is_some() {
        if let Some(addresses) = command
            .arguments
            .take_tagged_string_list(nodes, ":addresses")
        {
            for address in &addresses {
                parse_as_address(&mut command.arguments, nodes, address, ":addresses");
            }
        }
    }

    let mime = command.arguments.find_tag(nodes, ":mime").is_some();

    command.arguments.take_tagged_string(nodes, ":handle");

    command.arguments.number_remaining_arguments();
    let reason = command.arguments.take_string(nodes, 1);
    if mime {
        if let Some(reason) = reason {
            if !reason.is_ascii() {
                nodes.set_error(
                    command.node,
                    ":mime bodies must be all-ASCII, 8-bit text is not permitted",
                );
            }
            match Header::parse_mime(&reason) {
                Err(e) => {
                    nodes.set_error(command.node, format!("While parsing MIME header: {e}"));
                }
                Ok(header) => match Bodypart::parse(entity_body(&reason), &header) {
                    Err(e) => {
                        nodes.set_error(
                            command.node,
                            format!("While parsing MIME bodypart: {e}"),
                        );
                    }
                    Ok(body) => {
                        for field in header.fields() {
                            if !field.name().starts_with("Content-") {
                                nodes.set_error(
                                    command.node,
                                    format!("Header field not permitted: {}", field.name()),
                                );
                            }
                        }
                        if body.is_empty() {
                            nodes.set_error(
                                command.node,
                                "Vacation reply does not contain any text",
                            );
                        }
                    }
                },
            }
        }
    } else if reason.as_deref().map_or(true, str::is_empty) {
        nodes.set_error(command.node, "Empty vacation text does not make sense");
    }
}

fn analyze_notify(command: &mut Command, nodes: &mut Nodes) {
    nodes.require(command.node, "enotify");

    let from = if command.arguments.find_tag(nodes, ":from").is_some() {
        command.arguments.take_tagged_string(nodes, ":from")
    } else {
        None
    };

    if command.arguments.find_tag(nodes, ":importance").is_some() {
        if let Some(importance) = command.arguments.take_tagged_string(nodes, ":importance") {
            if !matches!(importance.as_str(), "1" | "2" | "3") {
                command
                    .arguments
                    .tag_error(nodes, ":importance", "Importance must be 1, 2 or 3");
            }
        }
    }

    if command.arguments.find_tag(nodes, ":options").is_some() {
        command.arguments.take_tagged_string_list(nodes, ":options");
    }

    if command.arguments.find_tag(nodes, ":message").is_some() {
        command.arguments.take_tagged_string(nodes, ":message");
    }

    command.arguments.number_remaining_arguments();
    let method_node = command
        .arguments
        .take_argument(1)
        .map_or(command.node, |index| {
            command.arguments.arguments[index].node
        });
    if let Some(method) = command.arguments.take_string(nodes, 1) {
        match NotifyMethod::parse(&method) {
            Ok(method) => {
                if let Some(from) = &from {
                    if let Err(e) = method.check_from(from) {
                        command.arguments.tag_error(nodes, ":from", e);
                    }
                }
            }
            Err(e) => nodes.set_error(method_node, e),
        }
    }
}

fn analyze_test(test: &mut Test, nodes: &mut Nodes) {
    trace!(identifier = %test.identifier, "analysing test");

    let mut ihave_names = None;

    match test.identifier.as_str() {
        "address" => {
            find_comparator(test, nodes);
            find_match_type(test, nodes);
            find_address_part(test, nodes);
            test.arguments.number_remaining_arguments();
            if let Some(headers) = take_header_field_list(test, nodes, 1) {
                test.headers = headers;
            }
            if let Some(keys) = test.arguments.take_string_list(nodes, 2) {
                test.keys = keys;
            }
        }
        "allof" | "anyof" => {
            if !test.arguments.arguments.is_empty() {
                nodes.set_error(
                    test.node,
                    format!(
                        "Test '{}' does not accept arguments, only a list of tests",
                        test.identifier
                    ),
                );
            }
            if test.arguments.tests.is_empty() {
                nodes.set_error(test.node, "Need at least one subsidiary test");
            }
            let node = test.node;
            for sub in &mut test.arguments.tests {
                analyze_test(sub, nodes);
                if nodes.ihave_failed(sub.node) {
                    nodes.set_ihave_failed(node);
                }
                let added = nodes.extensions_at(sub.node).to_vec();
                nodes.add_extensions(node, &added);
            }
        }
        "envelope" => {
            nodes.require(test.node, "envelope");
            find_comparator(test, nodes);
            find_match_type(test, nodes);
            find_address_part(test, nodes);
            test.arguments.number_remaining_arguments();
            if let Some(parts) = test.arguments.take_string_list(nodes, 1) {
                for part in parts {
                    let lower = part.to_lowercase();
                    if lower == "from" || lower == "to" {
                        test.envelope_parts.push(lower);
                    } else {
                        // extensions would widen this after the right
                        // require; none are implemented
                        nodes.set_error(
                            test.node,
                            format!("Unsupported envelope part: {part}"),
                        );
                        test.envelope_parts.push(part);
                    }
                }
            }
            if let Some(keys) = test.arguments.take_string_list(nodes, 2) {
                test.keys = keys;
            }
        }
        "exists" => {
            test.arguments.number_remaining_arguments();
            if let Some(headers) = take_header_field_list(test, nodes, 1) {
                test.headers = headers;
            }
        }
        "true" | "false" => {
            // nothing to check
        }
        "header" => {
            find_comparator(test, nodes);
            find_match_type(test, nodes);
            test.arguments.number_remaining_arguments();
            if let Some(headers) = take_header_field_list(test, nodes, 1) {
                test.headers = headers;
            }
            if let Some(keys) = test.arguments.take_string_list(nodes, 2) {
                test.keys = keys;
            }
        }
        "date" | "currentdate" => {
            nodes.require(test.node, "date");
            find_comparator(test, nodes);
            find_match_type(test, nodes);

            test.zone = test.arguments.take_tagged_string(nodes, ":zone");
            if test.zone.is_none()
                && test.arguments.find_tag(nodes, ":originalzone").is_some()
            {
                test.zone = Some("-0000".to_string());
            }

            test.arguments.number_remaining_arguments();
            let mut n = 1;
            if test.identifier == "date" {
                if let Some(headers) = take_header_field_list(test, nodes, n) {
                    if headers.len() != 1 {
                        nodes.set_error(test.node, "Only one date field may be specified");
                    }
                    test.headers = headers;
                }
                n += 1;
            }
            test.date_part = test.arguments.take_string(nodes, n);
            n += 1;
            if let Some(keys) = test.arguments.take_string_list(nodes, n) {
                test.keys = keys;
            }
        }
        "not" => {
            if !test.arguments.arguments.is_empty() {
                nodes.set_error(test.node, "Test 'not' does not accept arguments, only a test");
            }
            if test.arguments.tests.len() == 1 {
                analyze_test(&mut test.arguments.tests[0], nodes);
            } else {
                nodes.set_error(test.node, "Test 'not' needs exactly one subsidiary test");
            }
        }
        "size" => {
            test.arguments.allow_one_tag(nodes, &[":over", ":under"]);
            if test.arguments.find_tag(nodes, ":over").is_some() {
                test.size_over = true;
                test.size_limit = test
                    .arguments
                    .take_tagged_number(nodes, ":over")
                    .unwrap_or(0);
            } else if test.arguments.find_tag(nodes, ":under").is_some() {
                test.size_over = false;
                test.size_limit = test
                    .arguments
                    .take_tagged_number(nodes, ":under")
                    .unwrap_or(0);
            } else {
                nodes.set_error(test.node, "Test size needs :over or :under");
            }
        }
        "body" => {
            nodes.require(test.node, "body");
            find_comparator(test, nodes);
            find_match_type(test, nodes);
            test.arguments
                .allow_one_tag(nodes, &[":raw", ":text", ":content"]);
            if test.arguments.find_tag(nodes, ":raw").is_some() {
                test.body_match = BodyMatch::Raw;
            } else if test.arguments.find_tag(nodes, ":text").is_some() {
                test.body_match = BodyMatch::Text;
            } else if test.arguments.find_tag(nodes, ":content").is_some() {
                test.body_match = BodyMatch::Content;
                if let Some(types) = test.arguments.take_tagged_string_list(nodes, ":content") {
                    test.content_types = types;
                }
            }
            test.arguments.number_remaining_arguments();
            if let Some(keys) = test.arguments.take_string_list(nodes, 1) {
                test.keys = keys;
            }
        }
        "ihave" => {
            nodes.require(test.node, "ihave");
            test.arguments.number_remaining_arguments();
            ihave_names = test.arguments.take_string_list(nodes, 1);
        }
        "valid_notify_method" => {
            nodes.require(test.node, "enotify");
            test.arguments.number_remaining_arguments();
            let urls = test.arguments.take_string_list(nodes, 1);
            if urls.map_or(true, |u| u.is_empty()) {
                nodes.set_error(test.node, "No URLs");
            }
        }
        "notify_method_capability" => {
            nodes.require(test.node, "enotify");
            find_comparator(test, nodes);
            find_match_type(test, nodes);
            test.arguments.number_remaining_arguments();
            let method_node = test.arguments.take_argument(1).map_or(test.node, |index| {
                test.arguments.arguments[index].node
            });
            if let Some(url) = test.arguments.take_string(nodes, 1) {
                if let Err(e) = NotifyMethod::parse(&url) {
                    nodes.set_error(method_node, e);
                }
            }
            // the capability name; any is allowed
            test.arguments.take_string(nodes, 2);
            if let Some(keys) = test.arguments.take_string_list(nodes, 3) {
                test.keys = keys;
            }
        }
        _ => {
            nodes.set_error(test.node, format!("Unknown test: {}", test.identifier));
        }
    }

    test.arguments.flag_unparsed_as_bad(nodes);

    // A correctly parsed ihave naming only supported extensions acts like a
    // require at this spot; naming anything else marks the scope as failed,
    // which suppresses errors instead of raising them.
    if test.identifier == "ihave" && nodes.error(test.node).is_none() {
        if let Some(names) = ihave_names {
            if names.iter().all(|name| is_supported(name)) {
                nodes.add_extensions(test.node, &names);
            } else {
                nodes.set_ihave_failed(test.node);
            }
        }
    }
}

/// Records an error against `tag` if `text` is not a single address.
fn parse_as_address(list: &mut ArgumentList, nodes: &mut Nodes, text: &str, tag: &str) {
    if let Err(e) = Address::parse_single(text) {
        list.tag_error(nodes, tag, e.to_string());
    }
}

/// Finds any specified comparator name and sets the comparator accordingly.
fn find_comparator(test: &mut Test, nodes: &mut Nodes) {
    match test.arguments.take_tagged_string(nodes, ":comparator") {
        None => nodes.require(test.node, "comparator-i;ascii-casemap"),
        Some(name) => match Collation::create(&name) {
            Some(collation) => {
                test.comparator = Some(collation);
                nodes.require(test.node, &format!("comparator-{name}"));
            }
            None => {
                test.arguments
                    .tag_error(nodes, ":comparator", format!("Unknown comparator: {name}"));
            }
        },
    }
}

/// Finds the match-type tags and reacts sensibly.
fn find_match_type(test: &mut Test, nodes: &mut Nodes) {
    test.arguments
        .allow_one_tag(nodes, &[":is", ":matches", ":contains", ":value", ":count"]);
    if test.arguments.find_tag(nodes, ":is").is_some() {
        test.match_type = MatchType::Is;
    } else if test.arguments.find_tag(nodes, ":matches").is_some() {
        test.match_type = MatchType::Matches;
    } else if test.arguments.find_tag(nodes, ":contains").is_some() {
        test.match_type = MatchType::Contains;
    } else if test.arguments.find_tag(nodes, ":value").is_some() {
        test.match_type = MatchType::Value;
    } else if test.arguments.find_tag(nodes, ":count").is_some() {
        test.match_type = MatchType::Count;
    }

    if matches!(test.match_type, MatchType::Value | MatchType::Count) {
        nodes.require(test.node, "relational");
        let tag = if test.match_type == MatchType::Count {
            ":count"
        } else {
            ":value"
        };
        let op = test
            .arguments
            .take_tagged_string(nodes, tag)
            .unwrap_or_default()
            .to_ascii_uppercase();
        test.relational = match op.as_str() {
            "GT" => Some(Relational::Gt),
            "GE" => Some(Relational::Ge),
            "LT" => Some(Relational::Lt),
            "LE" => Some(Relational::Le),
            "EQ" => Some(Relational::Eq),
            "NE" => Some(Relational::Ne),
            _ => {
                test.arguments
                    .tag_error(nodes, tag, format!("Unknown relational operator: {op}"));
                None
            }
        };
    }
}

/// Finds the address-part tags and reacts sensibly.
fn find_address_part(test: &mut Test, nodes: &mut Nodes) {
    test.arguments
        .allow_one_tag(nodes, &[":localpart", ":domain", ":user", ":detail", ":all"]);
    if test.arguments.find_tag(nodes, ":localpart").is_some() {
        test.address_part = AddressPart::Localpart;
    } else if test.arguments.find_tag(nodes, ":domain").is_some() {
        test.address_part = AddressPart::Domain;
    } else if test.arguments.find_tag(nodes, ":user").is_some() {
        test.address_part = AddressPart::User;
    } else if test.arguments.find_tag(nodes, ":detail").is_some() {
        test.address_part = AddressPart::Detail;
    } else if test.arguments.find_tag(nodes, ":all").is_some() {
        test.address_part = AddressPart::All;
    }

    if matches!(test.address_part, AddressPart::User | AddressPart::Detail) {
        nodes.require(test.node, "subaddress");
    }
}

/// Takes positional argument `n` as a header-field list: every name must be
/// a legal RFC 5322 field name, and for the `address` test it must also
/// name an address-bearing field. Names come back header-cased.
fn take_header_field_list(test: &mut Test, nodes: &mut Nodes, n: usize) -> Option<Vec<String>> {
    let Some(index) = test.arguments.take_argument(n) else {
        nodes.set_error(test.node, "Missing header field list");
        return None;
    };
    let is_address_test = test.identifier == "address";
    let argument = &mut test.arguments.arguments[index];
    argument.parsed = true;
    argument.assert_string_list(nodes);
    let node = argument.node;
    let ArgumentValue::StringList(names) = &mut argument.value else {
        return None;
    };

    for name in names.iter_mut() {
        if name.is_empty() {
            nodes.set_error(node, "Empty header field names are not allowed");
        }
        for c in name.chars() {
            let v = c as u32;
            if !(33..=126).contains(&v) || v == 58 {
                nodes.set_error(
                    node,
                    format!("Illegal character (ASCII {v}) seen in header field name: {name}"),
                );
            }
        }
        if is_address_test {
            let is_address_field = FieldKind::of(name).is_some_and(FieldKind::is_address);
            if !is_address_field {
                nodes.set_error(node, format!("Not an address field: {name}"));
            }
        }
        let cased = header_cased(name);
        if *name != cased {
            *name = cased;
        }
    }

    Some(names.clone())
}

impl Argument {
    /// Records an error if this argument isn't a number.
    fn assert_number(&self, nodes: &mut Nodes) {
        match &self.value {
            ArgumentValue::Tag(_) => {
                nodes.set_error(self.node, "Expected a number here, not a tag");
            }
            ArgumentValue::StringList(_) => {
                nodes.set_error(self.node, "Expected a number here, not a string or string list");
            }
            ArgumentValue::Number(_) => {}
        }
    }

    /// Records an error if this argument isn't a single string.
    fn assert_string(&self, nodes: &mut Nodes) {
        match &self.value {
            ArgumentValue::Tag(_) => {
                nodes.set_error(self.node, "Expected a string here, not a tag");
            }
            ArgumentValue::Number(_) => {
                nodes.set_error(self.node, "Expected a string here, not a number");
            }
            ArgumentValue::StringList(l) if l.is_empty() => {
                nodes.set_error(self.node, "Expected a single string here");
            }
            ArgumentValue::StringList(l) if l.len() > 1 => {
                nodes.set_error(self.node, "Expected a single string here, not a string list");
            }
            ArgumentValue::StringList(_) => {}
        }
    }

    /// Records an error if this argument isn't a string list.
    fn assert_string_list(&self, nodes: &mut Nodes) {
        match &self.value {
            ArgumentValue::Tag(_) => {
                nodes.set_error(self.node, "Expected a string list here, not a tag");
            }
            ArgumentValue::Number(_) => {
                nodes.set_error(self.node, "Expected a string list here, not a number");
            }
            ArgumentValue::StringList(l) if l.is_empty() => {
                nodes.set_error(self.node, "Expected a string list here");
            }
            ArgumentValue::StringList(_) => {}
        }
    }
}

impl ArgumentList {
    /// Finds the argument tagged `tag` and returns its index, marking it
    /// parsed. If the tag occurs more than once, all occurrences are
    /// flagged as bad and the first is returned.
    fn find_tag(&mut self, nodes: &mut Nodes, tag: &str) -> Option<usize> {
        let first = self.arguments.iter().position(|a| a.tag() == Some(tag))?;
        let first_node = self.arguments[first].node;
        for argument in &self.arguments[first + 1..] {
            if argument.tag() == Some(tag) {
                nodes.set_error(first_node, format!("Tag occurs twice: {tag}"));
                nodes.set_error(argument.node, format!("Tag occurs twice: {tag}"));
            }
        }
        self.arguments[first].parsed = true;
        Some(first)
    }

    /// Makes sure `tag` occurs at most once and returns the index of the
    /// following argument, marking both parsed. Records an error if the
    /// tag occurs twice or is the last argument.
    fn argument_following_tag(&mut self, nodes: &mut Nodes, tag: &str) -> Option<usize> {
        let first = self.arguments.iter().position(|a| a.tag() == Some(tag))?;
        let first_node = self.arguments[first].node;
        self.arguments[first].parsed = true;
        for argument in &self.arguments[first + 1..] {
            if argument.tag() == Some(tag) {
                nodes.set_error(first_node, format!("Tag used twice: {tag}"));
                nodes.set_error(argument.node, format!("Tag used twice: {tag}"));
            }
        }
        if first + 1 < self.arguments.len() {
            self.arguments[first + 1].parsed = true;
            Some(first + 1)
        } else {
            nodes.set_error(first_node, format!("Tag not followed by argument: {tag}"));
            None
        }
    }

    /// Looks for `tag` and returns the following string. Records an error
    /// if anything looks wrong.
    fn take_tagged_string(&mut self, nodes: &mut Nodes, tag: &str) -> Option<String> {
        let index = self.argument_following_tag(nodes, tag)?;
        self.arguments[index].assert_string(nodes);
        match &self.arguments[index].value {
            ArgumentValue::StringList(l) => l.first().cloned(),
            _ => None,
        }
    }

    /// Looks for `tag` and returns the following string list. Records an
    /// error if anything looks wrong.
    fn take_tagged_string_list(&mut self, nodes: &mut Nodes, tag: &str) -> Option<Vec<String>> {
        let index = self.argument_following_tag(nodes, tag)?;
        self.arguments[index].assert_string_list(nodes);
        match &self.arguments[index].value {
            ArgumentValue::StringList(l) => Some(l.clone()),
            _ => None,
        }
    }

    /// Looks for `tag` and returns the following number. Records an error
    /// if anything looks wrong.
    fn take_tagged_number(&mut self, nodes: &mut Nodes, tag: &str) -> Option<u32> {
        let index = self.argument_following_tag(nodes, tag)?;
        self.arguments[index].assert_number(nodes);
        match self.arguments[index].value {
            ArgumentValue::Number(n) => Some(n),
            _ => None,
        }
    }

    /// Asserts that at most one of `tags` occurs.
    fn allow_one_tag(&self, nodes: &mut Nodes, tags: &[&str]) {
        let offenders: Vec<_> = self
            .arguments
            .iter()
            .filter(|a| a.tag().is_some_and(|t| tags.contains(&t)))
            .collect();
        if offenders.len() < 2 {
            return;
        }
        let first_tag = offenders[0].tag().map_or(String::new(), str::to_string);
        nodes.set_error(offenders[0].node, "Mutually exclusive tags used");
        for argument in &offenders[1..] {
            let tag = argument.tag().unwrap_or_default();
            nodes.set_error(
                argument.node,
                format!("Tag {first_tag} conflicts with {tag}"),
            );
        }
    }

    /// Assigns ordinals 1..n to the arguments that are still unconsumed,
    /// for `take_string`/`take_string_list`/`take_number` to pick up.
    fn number_remaining_arguments(&mut self) {
        self.numbered = self
            .arguments
            .iter()
            .enumerate()
            .filter(|(_, a)| !a.parsed)
            .map(|(i, _)| i)
            .collect();
    }

    /// Takes positional argument `n` as a string list.
    fn take_string_list(&mut self, nodes: &mut Nodes, n: usize) -> Option<Vec<String>> {
        let Some(&index) = self.numbered.get(n - 1) else {
            nodes.set_error(self.node, "Missing string/list argument");
            return None;
        };
        let argument = &mut self.arguments[index];
        argument.parsed = true;
        argument.assert_string_list(nodes);
        match &argument.value {
            ArgumentValue::StringList(l) => Some(l.clone()),
            _ => None,
        }
    }

    /// Takes positional argument `n` as a single string.
    fn take_string(&mut self, nodes: &mut Nodes, n: usize) -> Option<String> {
        let Some(&index) = self.numbered.get(n - 1) else {
            nodes.set_error(self.node, "Missing string argument");
            return None;
        };
        let argument = &mut self.arguments[index];
        argument.parsed = true;
        argument.assert_string(nodes);
        match &argument.value {
            ArgumentValue::StringList(l) => l.first().cloned(),
            _ => None,
        }
    }

    /// Returns the index of positional argument `n` without marking it
    /// parsed or checking anything.
    fn take_argument(&self, n: usize) -> Option<usize> {
        self.numbered.get(n - 1).copied()
    }

    /// Records `message` on the argument tagged `tag`, or failing that on
    /// this list.
    fn tag_error(&mut self, nodes: &mut Nodes, tag: &str, message: impl Into<String>) {
        let target = self
            .argument_following_tag(nodes, tag)
            .or_else(|| self.find_tag(nodes, tag));
        match target {
            Some(index) => nodes.set_error(self.arguments[index].node, message),
            None => nodes.set_error(self.node, message),
        }
    }

    /// Marks all unconsumed arguments as errors. Nothing looked at them,
    /// so something must be wrong.
    fn flag_unparsed_as_bad(&self, nodes: &mut Nodes) {
        for argument in &self.arguments {
            if argument.parsed {
                continue;
            }
            match &argument.value {
                ArgumentValue::Number(_) => {
                    nodes.set_error(argument.node, "Why is this number here?");
                }
                ArgumentValue::StringList(_) => {
                    nodes.set_error(argument.node, "Why is this string/list here?");
                }
                ArgumentValue::Tag(t) => {
                    nodes.set_error(argument.node, format!("Unknown tag: {t}"));
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
    use crate::parser;

    fn analyzed(source: &str) -> (Nodes, Vec<Command>) {
        let mut nodes = Nodes::default();
        let (_, mut commands) = parser::parse(source, &mut nodes);
        analyze(&mut commands, &mut nodes);
        crate::extensions::resolve(&mut nodes);
        (nodes, commands)
    }

    fn messages(source: &str) -> Vec<String> {
        let (nodes, _) = analyzed(source);
        nodes
            .collect_errors()
            .into_iter()
            .map(|e| e.message)
            .collect()
    }

    #[test]
    fn test_duplicate_tag_flags_both() {
        // :days is looked up with find_tag first, so duplicates get the
        // "occurs twice" wording on both occurrences
        let msgs = messages("require [\"vacation\"]; vacation :days 3 :days 4 \"gone\";");
        assert_eq!(
            msgs.iter()
                .filter(|m| *m == "Tag occurs twice: :days")
                .count(),
            2
        );
    }

    #[test]
    fn test_duplicate_value_tag_flags_both() {
        // :subject goes straight through argument_following_tag
        let msgs =
            messages("require [\"vacation\"]; vacation :subject \"a\" :subject \"b\" \"gone\";");
        assert_eq!(
            msgs.iter()
                .filter(|m| *m == "Tag used twice: :subject")
                .count(),
            2
        );
    }

    #[test]
    fn test_tag_without_value() {
        let msgs = messages("require [\"vacation\"]; vacation \"gone\" :days;");
        assert!(msgs.contains(&"Tag not followed by argument: :days".to_string()));
    }

    #[test]
    fn test_wrong_shape_after_tag() {
        let msgs = messages("require [\"vacation\"]; vacation :days \"three\" \"gone\";");
        assert!(msgs.contains(&"Expected a number here, not a string or string list".to_string()));
    }

    #[test]
    fn test_unknown_tag_flagged() {
        let msgs = messages("keep :frobnicate;");
        assert!(msgs.contains(&"Unknown tag: :frobnicate".to_string()));
    }

    #[test]
    fn test_stray_number_flagged() {
        let msgs = messages("keep 42;");
        assert!(msgs.contains(&"Why is this number here?".to_string()));
    }

    #[test]
    fn test_stray_string_flagged() {
        let msgs = messages("keep \"x\";");
        assert!(msgs.contains(&"Why is this string/list here?".to_string()));
    }

    #[test]
    fn test_unknown_command() {
        let msgs = messages("frobnicate;");
        assert_eq!(msgs, vec!["Command unknown: frobnicate".to_string()]);
    }

    #[test]
    fn test_unknown_test() {
        let msgs = messages("if frobnicate { keep; }");
        assert!(msgs.contains(&"Unknown test: frobnicate".to_string()));
    }

    #[test]
    fn test_if_requires_block() {
        let msgs = messages("if true;");
        assert!(!msgs.contains(&"Command if requires one test".to_string()));
        assert!(msgs.contains(&"Command if requires a subsidiary {..} block".to_string()));
    }

    #[test]
    fn test_if_requires_one_test() {
        let msgs = messages("if { keep; }");
        assert!(msgs.contains(&"Command if requires one test".to_string()));
    }

    #[test]
    fn test_plain_command_refuses_tests() {
        let msgs = messages("keep true;");
        assert!(msgs.contains(&"Command keep does not use tests".to_string()));
    }

    #[test]
    fn test_plain_command_refuses_block() {
        let msgs = messages("keep { stop; }");
        assert!(msgs.contains(&"Command keep does not use a subsidiary command block".to_string()));
    }

    #[test]
    fn test_elsif_needs_if() {
        let msgs = messages("elsif true { keep; }");
        assert!(msgs.contains(&"elsif is only permitted after if/elsif".to_string()));
    }

    #[test]
    fn test_elsif_chain_is_fine() {
        let msgs = messages("if true { keep; } elsif false { stop; } else { discard; }");
        assert!(msgs.is_empty(), "{msgs:?}");
    }

    #[test]
    fn test_require_unknown_extension() {
        let msgs = messages("require [\"fileinto\", \"frobnicate\", \"zap\"];");
        assert!(msgs.contains(
            &"Each string must be a supported sieve extension. \
              These are not: \"frobnicate\", \"zap\""
                .to_string()
        ));
    }

    #[test]
    fn test_require_not_first() {
        let msgs = messages("keep; require [\"fileinto\"];");
        assert!(msgs.contains(&"require is only permitted as the first command.".to_string()));
    }

    #[test]
    fn test_require_not_inside_block() {
        let msgs = messages("if true { require [\"fileinto\"]; }");
        assert!(msgs.contains(&"require is only permitted as the first command.".to_string()));
    }

    #[test]
    fn test_redirect_address_checked() {
        let msgs = messages("redirect \"not an address\";");
        assert!(msgs.contains(
            &"Expected one normal address (local@domain), but got: not an address".to_string()
        ));
        assert!(messages("redirect \"box@example.com\";").is_empty());
    }

    #[test]
    fn test_fileinto_mailbox_checked() {
        let msgs =
            messages("require [\"fileinto\"]; fileinto \"bad//name\";");
        assert!(msgs.contains(&"Expected mailbox name, but got: bad//name".to_string()));
    }

    #[test]
    fn test_fileinto_flags_consumes_its_list() {
        let msgs = messages(
            "require [\"fileinto\", \"imap4flags\"]; fileinto :flags [\"\\\\Seen\"] \"Junk\";",
        );
        assert!(msgs.is_empty(), "{msgs:?}");
    }

    #[test]
    fn test_setflag_takes_a_list() {
        let msgs = messages("require [\"imap4flags\"]; setflag [\"\\\\Seen\", \"\\\\Flagged\"];");
        assert!(msgs.is_empty(), "{msgs:?}");
        let msgs = messages("require [\"imap4flags\"]; addflag;");
        assert!(msgs.contains(&"Missing string/list argument".to_string()));
    }

    #[test]
    fn test_size_needs_over_or_under() {
        assert!(messages("if size :over 100K { keep; }").is_empty());
        assert!(messages("if size :under 1M { keep; }").is_empty());
        let msgs = messages("if size { keep; }");
        assert!(msgs.contains(&"Test size needs :over or :under".to_string()));
        let msgs = messages("if size :over :under 5 { keep; }");
        assert!(msgs.contains(&"Mutually exclusive tags used".to_string()));
    }

    #[test]
    fn test_header_test_attributes() {
        let (_, commands) = analyzed("if header :contains [\"to\", \"cc\"] \"me\" { keep; }");
        let test = &commands[0].arguments.tests[0];
        assert_eq!(test.match_type, MatchType::Contains);
        assert_eq!(test.headers, ["To", "Cc"]);
        assert_eq!(test.keys, ["me"]);
    }

    #[test]
    fn test_header_names_are_header_cased() {
        let (_, commands) = analyzed("if exists \"x-spam-flag\" { keep; }");
        assert_eq!(commands[0].arguments.tests[0].headers, ["X-Spam-Flag"]);
    }

    #[test]
    fn test_bad_header_name() {
        let msgs = messages("if exists \"subject line\" { keep; }");
        assert!(msgs.contains(
            &"Illegal character (ASCII 32) seen in header field name: subject line".to_string()
        ));
        let msgs = messages("if exists \"\" { keep; }");
        assert!(msgs.contains(&"Empty header field names are not allowed".to_string()));
    }

    #[test]
    fn test_address_test_needs_address_field() {
        let msgs = messages("if address :is \"subject\" \"x\" { keep; }");
        assert!(msgs.contains(&"Not an address field: subject".to_string()));
        assert!(messages("if address :is \"from\" \"x\" { keep; }").is_empty());
    }

    #[test]
    fn test_address_part_requires_subaddress() {
        let msgs = messages("if address :user \"from\" \"x\" { keep; }");
        assert!(msgs.contains(&"Missing require: \"subaddress\"".to_string()));
        let msgs = messages(
            "require [\"subaddress\"]; if address :detail \"from\" \"x\" { keep; }",
        );
        assert!(msgs.is_empty(), "{msgs:?}");
    }

    #[test]
    fn test_relational_operator() {
        let src = "require [\"relational\"]; if header :count \"ge\" \"received\" \"3\" { keep; }";
        let (nodes, commands) = analyzed(src);
        assert!(nodes.collect_errors().is_empty());
        let test = &commands[0].arguments.tests[0];
        assert_eq!(test.match_type, MatchType::Count);
        assert_eq!(test.relational, Some(Relational::Ge));
    }

    #[test]
    fn test_bad_relational_operator() {
        let msgs =
            messages("require [\"relational\"]; if header :value \"=>\" \"x\" \"y\" { keep; }");
        assert!(msgs.contains(&"Unknown relational operator: =>".to_string()));
    }

    #[test]
    fn test_unknown_comparator() {
        let msgs = messages("if header :comparator \"i;nonesuch\" :is \"x\" \"y\" { keep; }");
        assert!(msgs.contains(&"Unknown comparator: i;nonesuch".to_string()));
    }

    #[test]
    fn test_explicit_comparator_needs_require() {
        let msgs = messages("if header :comparator \"i;ascii-numeric\" :is \"x\" \"y\" { keep; }");
        assert!(msgs.contains(&"Missing require: \"comparator-i;ascii-numeric\"".to_string()));
        let msgs = messages(
            "require [\"comparator-i;ascii-numeric\"]; \
             if header :comparator \"i;ascii-numeric\" :is \"x\" \"y\" { keep; }",
        );
        assert!(msgs.is_empty(), "{msgs:?}");
    }

    #[test]
    fn test_octet_comparator_is_implicit() {
        let msgs = messages("if header :comparator \"i;octet\" :is \"x\" \"y\" { keep; }");
        assert!(msgs.is_empty(), "{msgs:?}");
    }

    #[test]
    fn test_envelope_parts() {
        let src = "require [\"envelope\"]; if envelope :is \"FROM\" \"x@example.com\" { keep; }";
        let (nodes, commands) = analyzed(src);
        assert!(nodes.collect_errors().is_empty());
        assert_eq!(commands[0].arguments.tests[0].envelope_parts, ["from"]);

        let msgs =
            messages("require [\"envelope\"]; if envelope :is \"cc\" \"x\" { keep; }");
        assert!(msgs.contains(&"Unsupported envelope part: cc".to_string()));
    }

    #[test]
    fn test_body_content_types() {
        let src = "require [\"body\"]; if body :content [\"text/plain\"] \"hi\" { keep; }";
        let (nodes, commands) = analyzed(src);
        assert!(nodes.collect_errors().is_empty());
        let test = &commands[0].arguments.tests[0];
        assert_eq!(test.body_match, BodyMatch::Content);
        assert_eq!(test.content_types, ["text/plain"]);
    }

    #[test]
    fn test_body_default_is_text() {
        let src = "require [\"body\"]; if body :contains \"hi\" { keep; }";
        let (_, commands) = analyzed(src);
        assert_eq!(commands[0].arguments.tests[0].body_match, BodyMatch::Text);
    }

    #[test]
    fn test_date_positional_arguments_in_order() {
        let src = "require [\"date\"]; \
                   if date :zone \"+0100\" \"received\" \"year\" [\"2024\"] { keep; }";
        let (nodes, commands) = analyzed(src);
        assert!(nodes.collect_errors().is_empty());
        let test = &commands[0].arguments.tests[0];
        assert_eq!(test.zone(), Some("+0100"));
        assert_eq!(test.headers, ["Received"]);
        assert_eq!(test.date_part(), Some("year"));
        assert_eq!(test.keys, ["2024"]);
    }

    #[test]
    fn test_originalzone_maps_to_minus_0000() {
        let src = "require [\"date\"]; \
                   if currentdate :originalzone \"hour\" [\"09\"] { keep; }";
        let (nodes, commands) = analyzed(src);
        assert!(nodes.collect_errors().is_empty());
        assert_eq!(commands[0].arguments.tests[0].zone(), Some("-0000"));
    }

    #[test]
    fn test_date_takes_one_field_only() {
        let msgs = messages(
            "require [\"date\"]; \
             if date [\"received\", \"date\"] \"year\" [\"2024\"] { keep; }",
        );
        assert!(msgs.contains(&"Only one date field may be specified".to_string()));
    }

    #[test]
    fn test_not_needs_exactly_one_test() {
        let msgs = messages("if not true { keep; }");
        assert!(msgs.is_empty(), "{msgs:?}");
        let msgs = messages("if not { keep; }");
        assert!(msgs.contains(&"Test 'not' needs exactly one subsidiary test".to_string()));
    }

    #[test]
    fn test_allof_rejects_arguments() {
        let msgs = messages("if allof \"x\" { keep; }");
        assert!(msgs
            .contains(&"Test 'allof' does not accept arguments, only a list of tests".to_string()));
    }

    #[test]
    fn test_anyof_needs_a_test() {
        let msgs = messages("if anyof () { keep; }");
        assert!(msgs.contains(&"Need at least one subsidiary test".to_string()));
    }

    #[test]
    fn test_vacation_mime_wants_content_fields_only() {
        let src = "require [\"vacation\"]; vacation :mime text:\n\
                   Content-Type: text/plain\n\
                   Subject: nope\n\
                   \n\
                   I am away.\n\
                   .\n\
                   ;";
        let msgs = messages(src);
        assert!(msgs.contains(&"Header field not permitted: Subject".to_string()));
    }

    #[test]
    fn test_vacation_mime_valid_entity() {
        let src = "require [\"vacation\"]; vacation :mime text:\n\
                   Content-Type: text/plain\n\
                   \n\
                   I am away.\n\
                   .\n\
                   ;";
        let msgs = messages(src);
        assert!(msgs.is_empty(), "{msgs:?}");
    }

    #[test]
    fn test_vacation_mime_must_be_ascii() {
        let src = "require [\"vacation\"]; vacation :mime \"Content-Type: text/plain\n\nborté\";";
        let msgs = messages(src);
        assert!(msgs
            .contains(&":mime bodies must be all-ASCII, 8-bit text is not permitted".to_string()));
    }

    #[test]
    fn test_vacation_mime_needs_body() {
        let src = "require [\"vacation\"]; vacation :mime \"Content-Type: text/plain\";";
        let msgs = messages(src);
        assert!(msgs.contains(&"Vacation reply does not contain any text".to_string()));
    }

    #[test]
    fn test_vacation_empty_reason() {
        let msgs = messages("require [\"vacation\"]; vacation \"\";");
        assert!(msgs.contains(&"Empty vacation text does not make sense".to_string()));
    }

    #[test]
    fn test_vacation_bad_from() {
        let msgs =
            messages("require [\"vacation\"]; vacation :from \"not an address\" \"gone\";");
        assert_eq!(msgs.len(), 1);
    }

    #[test]
    fn test_notify_importance_is_read_directly() {
        let msgs = messages("notify :importance \"5\" \"mailto:a@example.com\";");
        assert!(msgs.contains(&"Importance must be 1, 2 or 3".to_string()));
        let msgs = messages("notify :importance \"2\" \"mailto:a@example.com\";");
        assert!(!msgs.contains(&"Importance must be 1, 2 or 3".to_string()));
    }

    #[test]
    fn test_notify_method_checked() {
        let msgs = messages("notify \"xmpp:a@example.com\";");
        assert!(msgs.contains(&"Unknown notification method: xmpp".to_string()));
    }

    #[test]
    fn test_valid_notify_method_needs_urls() {
        let msgs = messages("if valid_notify_method [\"mailto:a@example.com\"] { keep; }");
        assert!(!msgs.contains(&"No URLs".to_string()));
    }

    #[test]
    fn test_notify_method_capability_ordinals() {
        let src = "if notify_method_capability \"mailto:a@example.com\" \"online\" [\"yes\"] \
                   { keep; }";
        let (nodes, commands) = analyzed(src);
        let test = &commands[0].arguments.tests[0];
        assert_eq!(test.keys, ["yes"]);
        // every positional argument was consumed by its own ordinal
        assert!(test.arguments.arguments.iter().all(Argument::is_parsed));
        // the only complaint is the missing enotify capability
        let msgs: Vec<_> = nodes.collect_errors().into_iter().map(|e| e.message).collect();
        assert_eq!(msgs, ["Missing require: \"enotify\""]);
    }

    #[test]
    fn test_positional_shape_mismatch() {
        // reject's reason must be a string, not a number
        let msgs = messages("require [\"reject\"]; reject 42;");
        assert!(msgs.contains(&"Expected a string here, not a number".to_string()));
    }
}
