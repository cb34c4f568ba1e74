//! Buffer management for vertex data and uniforms
//!
//! Mesh data is uploaded once into device-local memory through a staging buffer;
//! uniform buffers stay host-visible and are rewritten every frame.

use ash::{vk, Device};
use bytemuck::Pod;
use std::marker::PhantomData;
use std::mem;

use crate::render::backends::vulkan::rendering::CommandPool;
use crate::render::backends::vulkan::{PhysicalDeviceInfo, ResultExt, VulkanResult};

/// Buffer wrapper with memory management
pub struct Buffer {
    device: Device,
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    size: vk::DeviceSize,
}

impl Buffer {
    /// Create a buffer and bind freshly allocated memory to it
    pub fn new(
        device: Device,
        physical_device_info: &PhysicalDeviceInfo,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> VulkanResult<Self> {
        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.create_buffer(&buffer_info, None) }.context("vkCreateBuffer")?;

        let memory = match Self::allocate_and_bind(&device, physical_device_info, buffer, properties) {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { device.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        Ok(Self {
            device,
            buffer,
            memory,
            size,
        })
    }

    fn allocate_and_bind(
        device: &Device,
        physical_device_info: &PhysicalDeviceInfo,
        buffer: vk::Buffer,
        properties: vk::MemoryPropertyFlags,
    ) -> VulkanResult<vk::DeviceMemory> {
        let requirements = unsafe { device.get_buffer_memory_requirements(buffer) };
        let memory_type_index = physical_device_info.find_memory_type(requirements.memory_type_bits, properties)?;

        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type_index);

        let memory = unsafe { device.allocate_memory(&alloc_info, None) }.context("vkAllocateMemory")?;

        if let Err(e) = unsafe { device.bind_buffer_memory(buffer, memory, 0) } {
            unsafe { device.free_memory(memory, None) };
            return Err(e).context("vkBindBufferMemory");
        }

        Ok(memory)
    }

    /// Copy `data` into host-visible memory
    pub fn write_data<T: Pod>(&self, data: &[T]) -> VulkanResult<()> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let len = bytes.len().min(usize::try_from(self.size).unwrap_or(usize::MAX));

        unsafe {
            let ptr = self
                .device
                .map_memory(self.memory, 0, self.size, vk::MemoryMapFlags::empty())
                .context("vkMapMemory")?;
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.cast::<u8>(), len);
            self.device.unmap_memory(self.memory);
        }
        Ok(())
    }

    /// Get buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Get size
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_buffer(self.buffer, None);
            self.device.free_memory(self.memory, None);
        }
    }
}

/// Device-local buffer filled once through a staging copy
pub struct StaticBuffer {
    buffer: Buffer,
    element_count: u32,
}

impl StaticBuffer {
    /// Upload `data` with a one-time transfer on `queue`
    pub fn upload<T: Pod>(
        device: &Device,
        physical_device_info: &PhysicalDeviceInfo,
        command_pool: &CommandPool,
        queue: vk::Queue,
        usage: vk::BufferUsageFlags,
        data: &[T],
    ) -> VulkanResult<Self> {
        let size = mem::size_of_val(data) as vk::DeviceSize;

        let staging = Buffer::new(
            device.clone(),
            physical_device_info,
            size,
            vk::BufferUsageFlags::TRANSFER_SRC,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;
        staging.write_data(data)?;

        let buffer = Buffer::new(
            device.clone(),
            physical_device_info,
            size,
            vk::BufferUsageFlags::TRANSFER_DST | usage,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;

        command_pool.execute_one_time(queue, |recorder| {
            recorder.cmd_copy_buffer(staging.handle(), buffer.handle(), size);
        })?;

        Ok(Self {
            buffer,
            element_count: data.len() as u32,
        })
    }

    /// Get buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer.handle()
    }

    /// Number of elements uploaded
    pub fn element_count(&self) -> u32 {
        self.element_count
    }
}

/// Host-coherent uniform buffer for one `T`
pub struct UniformBuffer<T> {
    buffer: Buffer,
    _phantom: PhantomData<T>,
}

impl<T: Pod> UniformBuffer<T> {
    /// Create uniform buffer
    pub fn new(device: Device, physical_device_info: &PhysicalDeviceInfo) -> VulkanResult<Self> {
        let buffer = Buffer::new(
            device,
            physical_device_info,
            mem::size_of::<T>() as vk::DeviceSize,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;

        Ok(Self {
            buffer,
            _phantom: PhantomData,
        })
    }

    /// Update uniform data
    pub fn update(&self, data: &T) -> VulkanResult<()> {
        self.buffer.write_data(std::slice::from_ref(data))
    }

    /// Get buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer.handle()
    }

    /// Size of the block in bytes
    pub fn size(&self) -> vk::DeviceSize {
        self.buffer.size()
    }
}
