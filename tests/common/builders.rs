//! Test data builders for creating test objects

use regbind::{Binding, Direction, Format};

/// Builder for creating test Bindings
pub struct BindingBuilder {
    class: String,
    template: String,
    register: String,
    direction: Direction,
    event: Option<String>,
    format: Format,
}

impl BindingBuilder {
    /// A read binding of `register` displayed in `<register lowercase>-display`
    pub fn new(register: &str) -> Self {
        Self {
            class: register.to_string(),
            template: format!("{}-display", register.to_lowercase()),
            register: register.to_string(),
            direction: Direction::Read,
            event: None,
            format: Format::default(),
        }
    }

    pub fn class(mut self, class: &str) -> Self {
        self.class = class.to_string();
        self
    }

    pub fn template(mut self, template: &str) -> Self {
        self.template = template.to_string();
        self
    }

    /// Make this a write binding triggered by `event`
    pub fn write_on(mut self, event: &str) -> Self {
        self.direction = Direction::Write;
        self.event = Some(event.to_string());
        self
    }

    pub fn format(mut self, spec: &str) -> Self {
        self.format = Format::printf(spec);
        self
    }

    pub fn script(mut self, source: &str) -> Self {
        self.format = Format::script(source);
        self
    }

    pub fn build(self) -> Binding {
        Binding {
            binding_class: self.class,
            template: self.template,
            register_name: self.register,
            direction: self.direction,
            event: self.event,
            format: self.format,
            write_callback: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binding_builder() {
        let binding = BindingBuilder::new("DAC0")
            .template("dac0-input")
            .write_on("change")
            .build();

        assert_eq!(binding.binding_class, "DAC0");
        assert_eq!(binding.template, "dac0-input");
        assert_eq!(binding.direction, Direction::Write);
        assert_eq!(binding.event.as_deref(), Some("change"));
    }
}
