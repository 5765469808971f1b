//! Register bus shared between the charge task and the bench console.
//!
//! The bus starts closed; every request fails with `BusError::Unavailable`
//! until `open` installs the peripheral. Each request runs inside the mutex so
//! a console access can never interleave with a charge-task transaction.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::RawMutex;
use meter_core::bus::{BusError, RegisterBus, RegisterRead, RegisterWrite};

pub struct SharedRegisterBus<M: RawMutex, B> {
    inner: Mutex<M, RefCell<Option<B>>>,
}

impl<M: RawMutex, B: RegisterBus> SharedRegisterBus<M, B> {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(None)),
        }
    }

    /// Installs the peripheral, returning the one it replaced.
    pub fn open(&self, bus: B) -> Option<B> {
        self.inner.lock(|cell| cell.borrow_mut().replace(bus))
    }

    pub fn close(&self) -> Option<B> {
        self.inner.lock(|cell| cell.borrow_mut().take())
    }

    pub fn is_open(&self) -> bool {
        self.inner.lock(|cell| cell.borrow().is_some())
    }

    /// A `RegisterBus` view for one user. Handles are cheap and may be held
    /// by several tasks at once.
    pub fn handle(&self) -> SharedBusHandle<'_, M, B> {
        SharedBusHandle { shared: self }
    }

    fn with_bus<R>(&self, f: impl FnOnce(&mut B) -> Result<R, BusError>) -> Result<R, BusError> {
        self.inner.lock(|cell| match cell.borrow_mut().as_mut() {
            Some(bus) => f(bus),
            None => Err(BusError::Unavailable),
        })
    }
}

impl<M: RawMutex, B: RegisterBus> Default for SharedRegisterBus<M, B> {
    fn default() -> Self {
        Self::new()
    }
}

pub struct SharedBusHandle<'a, M: RawMutex, B> {
    shared: &'a SharedRegisterBus<M, B>,
}

impl<M: RawMutex, B> Clone for SharedBusHandle<'_, M, B> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<M: RawMutex, B> Copy for SharedBusHandle<'_, M, B> {}

impl<M: RawMutex, B: RegisterBus> RegisterBus for SharedBusHandle<'_, M, B> {
    fn read(&mut self, request: RegisterRead) -> Result<u8, BusError> {
        self.shared.with_bus(|bus| bus.read(request))
    }

    fn write(&mut self, request: RegisterWrite) -> Result<(), BusError> {
        self.shared.with_bus(|bus| bus.write(request))
    }
}
