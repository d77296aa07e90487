//! Record-and-replay [`TransactionContext`] for tests.
//!
//! Each accessor has a default return, optional returns for specific call
//! indices, an optional function that produces the return instead, and a
//! call counter. Every call is also appended to an ordered invocation log,
//! so a test can assert exactly how a contract operation used its context.
use super::context::TransactionContext;
use super::identity::Identity;
use super::ledger::Ledger;
use super::list::{MedicineList, RecordCollection};
use std::cell::{Cell, OnceCell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

struct Stubbed<T> {
    returns: Option<T>,
    returns_on_call: HashMap<usize, T>,
    calls_fn: Option<Box<dyn Fn() -> T>>,
    produced: Produced<T>,
    calls: Cell<usize>,
}

// Values handed out by `calls_fn`, one node per call. Nodes are only ever
// appended, so references into earlier nodes stay valid.
struct Produced<T> {
    value: OnceCell<T>,
    next: OnceCell<Box<Produced<T>>>,
}

impl<T> Default for Produced<T> {
    fn default() -> Self {
        Self {
            value: OnceCell::new(),
            next: OnceCell::new(),
        }
    }
}

impl<T> Produced<T> {
    fn nth(&self, call: usize) -> &Self {
        let mut node: &Self = self;
        for _ in 0..call {
            node = &**node.next.get_or_init(Box::default);
        }
        node
    }
}

#[derive(Default)]
pub struct MockContext {
    client_identity: Stubbed<Identity>,
    stub: Stubbed<Rc<dyn Ledger>>,
    medicine_list: Stubbed<Rc<dyn RecordCollection>>,
    invocations: RefCell<Vec<&'static str>>,
}

impl<T> Default for Stubbed<T> {
    fn default() -> Self {
        Self {
            returns: None,
            returns_on_call: HashMap::new(),
            calls_fn: None,
            produced: Produced::default(),
            calls: Cell::new(0),
        }
    }
}

impl<T> Stubbed<T> {
    fn next(&self, accessor: &'static str) -> &T {
        let call = self.calls.get();
        self.calls.set(call + 1);

        if let Some(produce) = &self.calls_fn {
            return self.produced.nth(call).value.get_or_init(|| produce());
        }

        match self.returns_on_call.get(&call).or(self.returns.as_ref()) {
            Some(value) => value,
            None => panic!("MockContext::{accessor} called (call {call}) with no return configured"),
        }
    }
}

impl MockContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context whose identity, stub and medicine list all resolve to `ledger`
    /// on every call, like the production context.
    pub fn over(identity: Identity, ledger: Rc<dyn Ledger>) -> Self {
        let mut ctx = Self::new();
        ctx.client_identity_returns(identity);
        ctx.medicine_list_returns(Rc::new(MedicineList::new(ledger.clone())));
        ctx.stub_returns(ledger);
        ctx
    }

    pub fn client_identity_returns(&mut self, identity: Identity) {
        self.client_identity.returns = Some(identity);
    }
    pub fn client_identity_returns_on_call(&mut self, call: usize, identity: Identity) {
        self.client_identity.returns_on_call.insert(call, identity);
    }
    /// Every call to `client_identity` returns a fresh value from `produce`,
    /// overriding configured returns.
    pub fn client_identity_calls<F>(&mut self, produce: F)
    where
        F: Fn() -> Identity + 'static,
    {
        self.client_identity.calls_fn = Some(Box::new(produce));
    }
    pub fn client_identity_call_count(&self) -> usize {
        self.client_identity.calls.get()
    }

    pub fn stub_returns(&mut self, ledger: Rc<dyn Ledger>) {
        self.stub.returns = Some(ledger);
    }
    pub fn stub_returns_on_call(&mut self, call: usize, ledger: Rc<dyn Ledger>) {
        self.stub.returns_on_call.insert(call, ledger);
    }
    pub fn stub_calls<F>(&mut self, produce: F)
    where
        F: Fn() -> Rc<dyn Ledger> + 'static,
    {
        self.stub.calls_fn = Some(Box::new(produce));
    }
    pub fn stub_call_count(&self) -> usize {
        self.stub.calls.get()
    }

    pub fn medicine_list_returns(&mut self, list: Rc<dyn RecordCollection>) {
        self.medicine_list.returns = Some(list);
    }
    pub fn medicine_list_returns_on_call(&mut self, call: usize, list: Rc<dyn RecordCollection>) {
        self.medicine_list.returns_on_call.insert(call, list);
    }
    pub fn medicine_list_calls<F>(&mut self, produce: F)
    where
        F: Fn() -> Rc<dyn RecordCollection> + 'static,
    {
        self.medicine_list.calls_fn = Some(Box::new(produce));
    }
    pub fn medicine_list_call_count(&self) -> usize {
        self.medicine_list.calls.get()
    }

    /// Accessor names in the order they were called.
    pub fn invocations(&self) -> Vec<&'static str> {
        self.invocations.borrow().clone()
    }

    fn record(&self, accessor: &'static str) {
        self.invocations.borrow_mut().push(accessor);
    }
}

impl TransactionContext for MockContext {
    /// # Panics
    ///
    /// Panics if neither a default nor a per-call identity is configured.
    fn client_identity(&self) -> &Identity {
        self.record("client_identity");
        self.client_identity.next("client_identity")
    }

    fn stub(&self) -> &dyn Ledger {
        self.record("stub");
        &**self.stub.next("stub")
    }

    fn medicine_list(&self) -> &dyn RecordCollection {
        self.record("medicine_list");
        &**self.medicine_list.next("medicine_list")
    }
}
