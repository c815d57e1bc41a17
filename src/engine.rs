export![backend, framebuffer, headless, shader, shaders, texture, uniform_buffer, web_media, webgl];
