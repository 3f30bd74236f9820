//! Closure-based map transform.

use std::rc::Rc;

use sknode_core::{ObservableValue, ValueConsumer, ValueProducer};

/// Applies a function to every input and emits the result.
///
/// Not configurable: the behavior is fixed in code.
pub struct LambdaTransform<I, O> {
    function: Box<dyn Fn(I) -> O>,
    output: ObservableValue<O>,
}

impl<I, O: Clone + 'static> LambdaTransform<I, O> {
    pub fn new<F>(initial: O, function: F) -> Rc<Self>
    where
        F: Fn(I) -> O + 'static,
    {
        Rc::new(Self {
            function: Box::new(function),
            output: ObservableValue::new(initial),
        })
    }
}

impl<I, O: Clone + 'static> ValueConsumer<I> for LambdaTransform<I, O> {
    fn set_input(&self, input: I, _input_channel: u8) {
        self.output.set((self.function)(input));
    }
}

impl<I, O: Clone + 'static> ValueProducer<O> for LambdaTransform<I, O> {
    fn output(&self) -> &ObservableValue<O> {
        &self.output
    }
}
