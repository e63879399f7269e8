use super::ast::{CompiledFunction, CompiledProgram, ConditionField, Field, PlainField};
use super::syntax::{Operator, Syntax};
use super::template::{Template, TemplateBuilder};
use crate::error::{CompileError, CompileErrorKind, CompileResult, Location};
use crate::native::{ArgumentSchema, normalize_name};
use crate::registry::FunctionRegistry;

/// Compile template text at reprocessing depth zero.
pub fn compile(
    registry: &FunctionRegistry,
    source: &str,
    path: Option<&str>,
) -> CompileResult<CompiledProgram> {
    compile_at(registry, source, path, 0)
}

/// Compile template text at an explicit reprocessing depth.
pub fn compile_at(
    registry: &FunctionRegistry,
    source: &str,
    path: Option<&str>,
    depth: usize,
) -> CompileResult<CompiledProgram> {
    let tags = find_tags(registry, source);
    if tags.is_empty() {
        return Ok(CompiledProgram {
            source: source.to_string(),
            path: path.map(str::to_string),
            code: source.to_string(),
            functions: Vec::new(),
            template: Template::literal(source),
            depth,
        });
    }

    let mut compiler = Compiler {
        registry,
        chars: source.chars().collect(),
        tags,
        next_tag: 0,
        index: 0,
        next_id: 0,
        path,
        depth,
    };
    let (code, functions, template) = compiler.compile_top_level()?;

    Ok(CompiledProgram {
        source: source.to_string(),
        path: path.map(str::to_string),
        code,
        functions,
        template,
        depth,
    })
}

/// A pattern match, positioned in characters.
#[derive(Debug, Clone)]
struct TagMatch {
    start: usize,
    end: usize,
    negated: bool,
    silent: bool,
    count: Option<String>,
    name: String,
}

fn find_tags(registry: &FunctionRegistry, source: &str) -> Vec<TagMatch> {
    let Some(pattern) = registry.pattern() else {
        return Vec::new();
    };

    let mut tags = Vec::new();
    let mut byte_cursor = 0;
    let mut char_cursor = 0;
    for caps in pattern.captures_iter(source) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        char_cursor += source[byte_cursor..whole.start()].chars().count();
        let start = char_cursor;
        let width = whole.as_str().chars().count();
        char_cursor += width;
        byte_cursor = whole.end();

        tags.push(TagMatch {
            start,
            end: start + width,
            negated: caps.get(1).is_some(),
            silent: caps.get(2).is_some(),
            count: caps.get(4).map(|m| m.as_str().to_string()),
            name: caps.get(5).map(|m| m.as_str().to_string()).unwrap_or_default(),
        });
    }
    tags
}

#[derive(Default)]
struct FieldBuilder {
    text: TemplateBuilder,
    functions: Vec<CompiledFunction>,
}

impl FieldBuilder {
    fn push_function(&mut self, function: CompiledFunction) {
        self.text.push_slot(&function.id);
        self.functions.push(function);
    }

    fn finish(self) -> PlainField {
        let (value, template) = self.text.finish();
        PlainField {
            value,
            functions: self.functions,
            template,
        }
    }
}

struct Compiler<'a> {
    registry: &'a FunctionRegistry,
    chars: Vec<char>,
    tags: Vec<TagMatch>,
    next_tag: usize,
    index: usize,
    next_id: usize,
    path: Option<&'a str>,
    depth: usize,
}

impl<'a> Compiler<'a> {
    /// Next tag at or after the cursor; tags the cursor has passed are dropped.
    fn next_tag(&mut self) -> Option<TagMatch> {
        while let Some(tag) = self.tags.get(self.next_tag) {
            if tag.start >= self.index {
                return Some(tag.clone());
            }
            self.next_tag += 1;
        }
        None
    }

    fn error(&self, kind: CompileErrorKind, at: usize) -> CompileError {
        CompileError::new(kind, Location::locate(&self.chars, at), self.path)
    }

    fn compile_top_level(&mut self) -> CompileResult<(String, Vec<CompiledFunction>, Template)> {
        let mut builder = TemplateBuilder::default();
        let mut functions = Vec::new();

        while let Some(tag) = self.next_tag() {
            if tag.start == self.index {
                self.next_tag += 1;
                let function = self.parse_function(&tag)?;
                builder.push_slot(&function.id);
                functions.push(function);
                continue;
            }

            let ch = self.chars[self.index];
            if ch == Syntax::ESCAPE && self.index + 1 < self.chars.len() {
                builder.push(self.chars[self.index + 1]);
                self.index += 2;
                continue;
            }
            builder.push(ch);
            self.index += 1;
        }

        // Text after the last tag is copied as-is.
        let rest: String = self.chars[self.index..].iter().collect();
        builder.push_str(&rest);

        let (code, template) = builder.finish();
        Ok((code, functions, template))
    }

    fn parse_function(&mut self, tag: &TagMatch) -> CompileResult<CompiledFunction> {
        self.index = tag.end;

        let native = self.registry.resolve(&tag.name).cloned().ok_or_else(|| {
            self.error(
                CompileErrorKind::UnregisteredFunction(normalize_name(&tag.name)),
                tag.start,
            )
        })?;
        let definition = native.definition();
        let name = definition.name.clone();

        let fields = match &definition.args {
            None => None,
            Some(schema) => {
                if self.chars.get(self.index) == Some(&Syntax::ARGS_OPEN) {
                    self.index += 1;
                    Some(self.parse_fields(tag, &name, schema)?)
                } else if schema.brackets {
                    return Err(self.error(
                        CompileErrorKind::MissingBrackets { function: name },
                        tag.start,
                    ));
                } else {
                    None
                }
            }
        };

        let index = self.next_id;
        self.next_id += 1;

        Ok(CompiledFunction {
            index,
            id: CompiledFunction::placeholder(index),
            name,
            negated: tag.negated,
            silent: tag.silent,
            count: tag.count.clone(),
            fields,
            depth: self.depth,
            native,
        })
    }

    fn parse_fields(
        &mut self,
        tag: &TagMatch,
        name: &str,
        schema: &ArgumentSchema,
    ) -> CompileResult<Vec<Field>> {
        if schema.fields.is_empty() {
            return match self.chars.get(self.index) {
                Some(&Syntax::ARGS_CLOSE) => {
                    self.index += 1;
                    Ok(Vec::new())
                }
                None => Err(self.error(
                    CompileErrorKind::UnclosedField {
                        function: name.to_string(),
                    },
                    tag.start,
                )),
                Some(_) => Err(self.error(
                    CompileErrorKind::TooManyArguments {
                        function: name.to_string(),
                        max: 0,
                    },
                    tag.start,
                )),
            };
        }

        let mut fields = Vec::new();
        let mut spec_index = 0;
        loop {
            let spec = &schema.fields[spec_index];
            let (field, terminator) = self.parse_field(tag, name, spec.condition)?;
            fields.push(field);

            if terminator == Syntax::ARGS_CLOSE {
                return Ok(fields);
            }
            if !spec.rest {
                spec_index += 1;
                if spec_index >= schema.fields.len() {
                    return Err(self.error(
                        CompileErrorKind::TooManyArguments {
                            function: name.to_string(),
                            max: schema.fields.len(),
                        },
                        tag.start,
                    ));
                }
            }
        }
    }

    fn parse_field(
        &mut self,
        tag: &TagMatch,
        name: &str,
        condition: bool,
    ) -> CompileResult<(Field, char)> {
        let mut current = FieldBuilder::default();
        let mut lhs: Option<FieldBuilder> = None;
        let mut op: Option<Operator> = None;

        let terminator = loop {
            let Some(&ch) = self.chars.get(self.index) else {
                return Err(self.error(
                    CompileErrorKind::UnclosedField {
                        function: name.to_string(),
                    },
                    tag.start,
                ));
            };

            if ch == Syntax::ESCAPE {
                if let Some(&escaped) = self.chars.get(self.index + 1) {
                    current.text.push(escaped);
                    self.index += 2;
                    continue;
                }
                return Err(self.error(
                    CompileErrorKind::UnclosedField {
                        function: name.to_string(),
                    },
                    tag.start,
                ));
            }

            if ch == Syntax::SEPARATOR || ch == Syntax::ARGS_CLOSE {
                self.index += 1;
                break ch;
            }

            if let Some(nested) = self.next_tag() {
                if nested.start == self.index {
                    self.next_tag += 1;
                    let function = self.parse_function(&nested)?;
                    current.push_function(function);
                    continue;
                }
            }

            if condition && op.is_none() {
                if let Some(found) = Operator::scan(&self.chars[self.index..]) {
                    self.index += found.width();
                    lhs = Some(std::mem::take(&mut current));
                    op = Some(found);
                    continue;
                }
            }

            current.text.push(ch);
            self.index += 1;
        };

        let field = if !condition {
            Field::Plain(current.finish())
        } else {
            match (op, lhs) {
                (Some(op), Some(lhs)) => Field::Condition(ConditionField {
                    op,
                    lhs: lhs.finish(),
                    rhs: Some(current.finish()),
                }),
                _ => Field::Condition(ConditionField {
                    op: Operator::Unknown,
                    lhs: current.finish(),
                    rhs: None,
                }),
            }
        };
        Ok((field, terminator))
    }
}
