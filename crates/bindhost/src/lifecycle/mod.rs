//! Bridge lifecycle: loading, instantiating and finalizing a module.
//!
//! A [`Bridge`] moves `Unloaded -> Instantiating -> Ready`, or to `Failed`
//! if anything along the way goes wrong. `Ready` and `Failed` are terminal:
//! initializing a ready bridge returns the existing instance, and
//! initializing a failed one returns [`InstantiationError::Failed`].

use std::io;
use std::rc::Rc;

use futures::stream::{self, LocalBoxStream, Stream, StreamExt};
use tracing::{debug, error, info, warn};
use wasmtime::{AsContextMut, Val};

use crate::closure;
use crate::config::Config;
use crate::cx::Cx;
use crate::engine::Engine;
use crate::error::{BoundaryError, Fault, InstantiationError};
use crate::instance::Instance;
use crate::linker::Linker;
use crate::module::Module;
use crate::parse::StreamingScan;
use crate::store::{self, Store};
use crate::value::{HostValue, Promise, WasmArgs, WasmResults};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Unloaded,
    Instantiating,
    Ready,
    Failed,
}

/// How the module that reached `Ready` was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPath {
    /// An already compiled [`Module`] was supplied.
    Precompiled,
    /// The bytes were fully buffered, then validated and compiled.
    Buffered,
    /// The bytes were validated incrementally while they streamed in.
    Streaming,
}

/// Input to [`Bridge::init_sync`].
pub enum ModuleSource {
    Bytes(Vec<u8>),
    Module(Module),
}

impl From<Vec<u8>> for ModuleSource {
    fn from(bytes: Vec<u8>) -> Self {
        ModuleSource::Bytes(bytes)
    }
}

impl From<&[u8]> for ModuleSource {
    fn from(bytes: &[u8]) -> Self {
        ModuleSource::Bytes(bytes.to_vec())
    }
}

impl From<Module> for ModuleSource {
    fn from(module: Module) -> Self {
        ModuleSource::Module(module)
    }
}

/// Input to [`Bridge::init`].
pub enum Resource {
    Bytes(Vec<u8>),
    Module(Module),
    Response(Response),
}

impl From<Vec<u8>> for Resource {
    fn from(bytes: Vec<u8>) -> Self {
        Resource::Bytes(bytes)
    }
}

impl From<Module> for Resource {
    fn from(module: Module) -> Self {
        Resource::Module(module)
    }
}

impl From<Response> for Resource {
    fn from(response: Response) -> Self {
        Resource::Response(response)
    }
}

/// A fetched module body together with its declared content type.
pub struct Response {
    content_type: Option<String>,
    body: LocalBoxStream<'static, io::Result<Vec<u8>>>,
}

impl Response {
    pub fn new<S>(content_type: Option<&str>, body: S) -> Self
    where
        S: Stream<Item = io::Result<Vec<u8>>> + 'static,
    {
        Response {
            content_type: content_type.map(str::to_string),
            body: body.boxed_local(),
        }
    }

    /// A response whose body arrives in `chunk_size`-byte pieces.
    pub fn from_bytes(content_type: Option<&str>, bytes: Vec<u8>, chunk_size: usize) -> Self {
        let chunks: Vec<io::Result<Vec<u8>>> = bytes
            .chunks(chunk_size.max(1))
            .map(|chunk| Ok(chunk.to_vec()))
            .collect();
        Self::new(content_type, stream::iter(chunks))
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Whether the content type's essence matches `mime`, ignoring case and parameters.
    fn is(&self, mime: &str) -> bool {
        self.content_type()
            .and_then(|ct| ct.split(';').next())
            .is_some_and(|essence| essence.trim().eq_ignore_ascii_case(mime))
    }

    async fn bytes(mut self) -> io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        while let Some(chunk) = self.body.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(buf)
    }
}

/// A module instance plus the host state it is bound to.
pub struct Bridge {
    engine: Engine,
    linker: Linker,
    store: Store,
    instance: Option<Instance>,
    status: Status,
    load_path: Option<LoadPath>,
}

impl Bridge {
    pub fn new(engine: &Engine, linker: Linker, config: Config) -> Self {
        Bridge {
            engine: engine.clone(),
            store: store::new_store(engine, config),
            linker,
            instance: None,
            status: Status::Unloaded,
            load_path: None,
        }
    }

    /// A bridge with the standard operation table.
    pub fn with_std_ops(engine: &Engine, config: Config) -> Self {
        let linker = Linker::new(&config).with_std_ops();
        Self::new(engine, linker, config)
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn load_path(&self) -> Option<LoadPath> {
        self.load_path
    }

    pub fn instance(&self) -> Option<Instance> {
        self.instance
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut Store {
        &mut self.store
    }

    pub fn linker(&self) -> &Linker {
        &self.linker
    }

    /// Synchronous initialization from bytes or a compiled module.
    pub fn init_sync(&mut self, source: impl Into<ModuleSource>) -> Result<Instance, InstantiationError> {
        if let Some(instance) = self.settled()? {
            return Ok(instance);
        }
        self.status = Status::Instantiating;
        let loaded = match source.into() {
            ModuleSource::Module(module) => Ok((module, LoadPath::Precompiled)),
            ModuleSource::Bytes(bytes) => Module::from_bytes(&self.engine, &bytes)
                .map(|module| (module, LoadPath::Buffered))
                .map_err(InstantiationError::Compile),
        };
        let result = loaded.and_then(|(module, path)| self.finalize(&module, path));
        self.settle(result)
    }

    /// Asynchronous initialization, streaming the module when possible.
    pub async fn init(&mut self, resource: impl Into<Resource>) -> Result<Instance, InstantiationError> {
        if let Some(instance) = self.settled()? {
            return Ok(instance);
        }
        self.status = Status::Instantiating;
        let loaded = self.load(resource.into()).await;
        let result = loaded.and_then(|(module, path)| self.finalize(&module, path));
        self.settle(result)
    }

    fn settled(&self) -> Result<Option<Instance>, InstantiationError> {
        match self.status {
            Status::Ready => Ok(self.instance),
            Status::Failed => Err(InstantiationError::Failed),
            Status::Instantiating => {
                debug!("restarting an abandoned initialization");
                Ok(None)
            }
            Status::Unloaded => Ok(None),
        }
    }

    async fn load(&self, resource: Resource) -> Result<(Module, LoadPath), InstantiationError> {
        match resource {
            Resource::Module(module) => Ok((module, LoadPath::Precompiled)),
            Resource::Bytes(bytes) => Module::from_bytes(&self.engine, &bytes)
                .map(|module| (module, LoadPath::Buffered))
                .map_err(InstantiationError::Compile),
            Resource::Response(response) => {
                let mime = self.store.data().config.module_mime.clone();
                if response.is(&mime) {
                    self.stream(response).await.map(|module| (module, LoadPath::Streaming))
                } else {
                    warn!(
                        content_type = response.content_type().unwrap_or("<none>"),
                        expected = %mime,
                        "module served with an unexpected content type; falling back to buffered instantiation, which is slower"
                    );
                    let bytes = response.bytes().await?;
                    Module::from_bytes(&self.engine, &bytes)
                        .map(|module| (module, LoadPath::Buffered))
                        .map_err(InstantiationError::Compile)
                }
            }
        }
    }

    async fn stream(&self, mut response: Response) -> Result<Module, InstantiationError> {
        let mut scan = StreamingScan::new(&self.engine);
        while let Some(chunk) = response.body.next().await {
            scan.feed(&chunk?).map_err(InstantiationError::Compile)?;
        }
        debug!(bytes = scan.received(), "module stream complete");
        Module::from_scan(&self.engine, scan).map_err(InstantiationError::Compile)
    }

    fn finalize(&mut self, module: &Module, path: LoadPath) -> Result<Instance, InstantiationError> {
        let instance = self.linker.instantiate(&mut self.store, module)?;
        self.load_path = Some(path);
        debug!(?path, "module instantiated; running start hook");
        instance.start(&mut self.store)?;
        Ok(instance)
    }

    fn settle(&mut self, result: Result<Instance, InstantiationError>) -> Result<Instance, InstantiationError> {
        match result {
            Ok(instance) => {
                info!(path = ?self.load_path, "bridge ready");
                self.instance = Some(instance);
                self.status = Status::Ready;
                Ok(instance)
            }
            Err(err) => {
                error!(error = %err, "bridge initialization failed");
                self.status = Status::Failed;
                Err(err)
            }
        }
    }

    fn ready_instance(&self) -> Result<Instance, Fault> {
        self.instance
            .filter(|_| self.status == Status::Ready)
            .ok_or(Fault::Boundary(BoundaryError::NotReady))
    }

    /// Calls a module export (typed API).
    pub fn call<A: WasmArgs, R: WasmResults>(&mut self, name: &str, args: A) -> Result<R, Fault> {
        let instance = self.ready_instance()?;
        instance.call(&mut self.store, name, args)
    }

    /// Calls a module export (dynamic API).
    pub fn call_dynamic(&mut self, name: &str, args: &[Val]) -> Result<Vec<Val>, Fault> {
        let instance = self.ready_instance()?;
        instance.call_dynamic(&mut self.store, name, args)
    }

    pub fn get_global(&mut self, name: &str) -> Option<Val> {
        let instance = self.instance?;
        instance.get_global(&mut self.store, name)
    }

    /// An operation context over this bridge's store.
    pub fn cx(&mut self) -> Cx<'_> {
        Cx::new(self.store.as_context_mut())
    }

    /// Invokes a host function value (for example a wrapped module closure).
    pub fn invoke(&mut self, func: &HostValue, args: &[HostValue]) -> Result<HostValue, Fault> {
        self.cx().call_function(func, &HostValue::Undefined, args)
    }

    /// Drops the host's reference to a closure wrapper.
    ///
    /// Returns `false` if `func` does not wrap a module closure.
    pub fn release(&mut self, func: &HostValue) -> Result<bool, Fault> {
        match func.as_function() {
            Some(func) => closure::dispose(&mut self.cx(), func),
            None => Ok(false),
        }
    }

    pub fn add_object(&mut self, value: HostValue) -> u32 {
        self.cx().add_object(value)
    }

    pub fn get_object(&mut self, handle: u32) -> Result<HostValue, BoundaryError> {
        self.cx().get_object(handle)
    }

    pub fn take_object(&mut self, handle: u32) -> Result<HostValue, BoundaryError> {
        self.cx().take_object(handle)
    }

    /// The object `__wbg_global` hands out.
    pub fn global(&self) -> HostValue {
        self.store.data().global.clone()
    }

    pub fn define_global(&mut self, name: &str, value: HostValue) -> Result<(), Fault> {
        self.global().set_property(&HostValue::from(name), value).map(drop)
    }

    pub fn resolve(&mut self, promise: &Rc<Promise>, value: HostValue) -> bool {
        promise.resolve(value, &mut self.store.data_mut().jobs)
    }

    pub fn reject(&mut self, promise: &Rc<Promise>, reason: HostValue) -> bool {
        promise.reject(reason, &mut self.store.data_mut().jobs)
    }

    /// Drains the microtask queue, including tasks queued while draining.
    ///
    /// Returns how many tasks ran. A failing task is logged and does not
    /// stop the rest.
    pub fn run_microtasks(&mut self) -> usize {
        let mut cx = self.cx();
        let mut ran = 0;
        while let Some(job) = cx.state_mut().jobs.pop_front() {
            ran += 1;
            if let Err(fault) = job.run(&mut cx) {
                error!(error = %fault, "microtask failed");
            }
        }
        ran
    }
}
